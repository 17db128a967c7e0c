//! turn any function or closure into a uniform, type-erased procedure
//!
//! the arity, the parameter types and the return kind are resolved at bind
//! time from the callable's own signature through the `Callable` impls below.
use std::any::{type_name, TypeId};
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{self, Reply};
use crate::Error;

/// whether a procedure produces a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// returns `()`, the reply is `Reply::Void`
    Void,
    /// returns a value, the reply is `Reply::Value`
    Value,
}

/// A callable that can be bound as a remote procedure
///
/// implemented for every `Fn(A0, .., An) -> R` with up to 12 parameters where
/// each parameter is `DeserializeOwned` and the return type is `Serialize`.
/// `Args` is the parameter tuple, it only exists to select the impl.
pub trait Callable<Args>: Send + Sync + 'static {
    /// the parameter type names in declaration order
    fn param_types(&self) -> Vec<&'static str>;

    /// whether the callable returns `()`
    fn return_kind(&self) -> ReturnKind;

    /// decode the arguments, invoke and encode the result
    /// the argument count is already checked by the caller
    fn call(&self, name: &str, args: Vec<Vec<u8>>) -> Result<Reply, Error>;
}

fn decode_arg<T: DeserializeOwned>(name: &str, index: usize, value: &[u8]) -> Result<T, Error> {
    codec::decode_value(value).map_err(|e| {
        Error::TypeMismatch(format!(
            "argument {index} of {name}: expected {}: {e}",
            type_name::<T>()
        ))
    })
}

fn return_kind_of<R: 'static>() -> ReturnKind {
    if TypeId::of::<R>() == TypeId::of::<()>() {
        ReturnKind::Void
    } else {
        ReturnKind::Value
    }
}

fn encode_ret<R: Serialize + 'static>(ret: R) -> Result<Reply, Error> {
    match return_kind_of::<R>() {
        ReturnKind::Void => Ok(Reply::Void),
        ReturnKind::Value => codec::encode_value(&ret).map(Reply::Value),
    }
}

macro_rules! impl_callable {
    ($($arg:ident: $ty:ident),*) => {
        impl<Func, Ret, $($ty,)*> Callable<($($ty,)*)> for Func
        where
            Func: Fn($($ty),*) -> Ret + Send + Sync + 'static,
            Ret: Serialize + 'static,
            $($ty: DeserializeOwned,)*
        {
            fn param_types(&self) -> Vec<&'static str> {
                vec![$(type_name::<$ty>()),*]
            }

            fn return_kind(&self) -> ReturnKind {
                return_kind_of::<Ret>()
            }

            #[allow(unused_variables, unused_mut)]
            fn call(&self, name: &str, args: Vec<Vec<u8>>) -> Result<Reply, Error> {
                let mut args = args.into_iter().enumerate();
                $(
                    let $arg: $ty = match args.next() {
                        Some((index, value)) => decode_arg(name, index, &value)?,
                        None => return Err(Error::TypeMismatch(format!("missing argument of {name}"))),
                    };
                )*
                encode_ret((self)($($arg),*))
            }
        }
    };
}

impl_callable!();
impl_callable!(a0: A0);
impl_callable!(a0: A0, a1: A1);
impl_callable!(a0: A0, a1: A1, a2: A2);
impl_callable!(a0: A0, a1: A1, a2: A2, a3: A3);
impl_callable!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4);
impl_callable!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5);
impl_callable!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6);
impl_callable!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7);
impl_callable!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8);
impl_callable!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9);
impl_callable!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9, a10: A10);
impl_callable!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9, a10: A10, a11: A11);

type Invoker = Box<dyn Fn(&str, Vec<Vec<u8>>) -> Result<Reply, Error> + Send + Sync>;

/// A named procedure with a fixed signature, ready to be invoked with a
/// generic argument list
pub struct BoundProcedure {
    name: String,
    param_types: Vec<&'static str>,
    return_kind: ReturnKind,
    invoker: Invoker,
}

impl fmt::Debug for BoundProcedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundProcedure")
            .field("name", &self.name)
            .field("param_types", &self.param_types)
            .field("return_kind", &self.return_kind)
            .finish()
    }
}

impl BoundProcedure {
    /// bind the callable under the name
    pub fn new<F, A>(name: impl Into<String>, func: F) -> Self
    where
        F: Callable<A>,
    {
        BoundProcedure {
            name: name.into(),
            param_types: func.param_types(),
            return_kind: func.return_kind(),
            invoker: Box::new(move |name, args| func.call(name, args)),
        }
    }

    /// the procedure name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// the number of parameters
    pub fn arity(&self) -> usize {
        self.param_types.len()
    }

    /// the parameter type names
    pub fn param_types(&self) -> &[&'static str] {
        &self.param_types
    }

    /// the return kind
    pub fn return_kind(&self) -> ReturnKind {
        self.return_kind
    }

    /// check the arity, decode the arguments, call and encode the result
    pub fn invoke(&self, args: Vec<Vec<u8>>) -> Result<Reply, Error> {
        if args.len() != self.arity() {
            return Err(Error::ArityMismatch {
                name: self.name.clone(),
                actual: args.len(),
                expected: self.arity(),
            });
        }
        (self.invoker)(&self.name, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_value, Args};
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Message {
        v: i32,
    }

    fn f4(mut m: Message) -> Message {
        m.v = 73;
        m
    }

    fn args<A: Args>(a: A) -> Vec<Vec<u8>> {
        a.into_args().unwrap()
    }

    #[test]
    fn signature_is_derived_at_bind_time() {
        let sum = BoundProcedure::new("sum", |a: i32, b: i32| a + b);
        assert_eq!(sum.name(), "sum");
        assert_eq!(sum.arity(), 2);
        assert_eq!(sum.param_types(), &["i32", "i32"]);
        assert_eq!(sum.return_kind(), ReturnKind::Value);

        let noop = BoundProcedure::new("f1", || {});
        assert_eq!(noop.arity(), 0);
        assert_eq!(noop.return_kind(), ReturnKind::Void);
    }

    #[test]
    fn invoke_decodes_and_encodes() {
        let sum = BoundProcedure::new("sum", |a: i32, b: i32| a + b);
        let ret = sum.invoke(args((2, 3))).unwrap();
        assert_eq!(ret, Reply::Value(encode_value(&5i32).unwrap()));
        assert_eq!(ret.into_value::<i32>().unwrap(), 5);

        let f4 = BoundProcedure::new("f4", f4);
        let ret = f4.invoke(args((Message { v: 1 },))).unwrap();
        assert_eq!(ret.into_value::<Message>().unwrap(), Message { v: 73 });
    }

    #[test]
    fn non_finite_and_wide_values_pass_through() {
        let is_nan = BoundProcedure::new("isnan", |x: f64| x.is_nan());
        let ret = is_nan.invoke(args((f64::NAN,))).unwrap();
        assert!(ret.into_value::<bool>().unwrap());

        let inf = BoundProcedure::new("inf", || f64::INFINITY);
        assert_eq!(inf.invoke(args(())).unwrap().into_value::<f64>().unwrap(), f64::INFINITY);

        let neg = BoundProcedure::new("neg", |x: f64| -x);
        let ret = neg.invoke(args((f64::INFINITY,))).unwrap();
        assert_eq!(ret.into_value::<f64>().unwrap(), f64::NEG_INFINITY);

        let opt = BoundProcedure::new("opt", |x: Option<f64>| x);
        let ret = opt.invoke(args((Some(f64::NAN),))).unwrap();
        assert!(ret.into_value::<Option<f64>>().unwrap().unwrap().is_nan());

        let wide = BoundProcedure::new("wide", |x: u128| x);
        let ret = wide.invoke(args((u128::MAX,))).unwrap();
        assert_eq!(ret.into_value::<u128>().unwrap(), u128::MAX);
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let sum = BoundProcedure::new("sum", |a: i32, b: i32| a + b);
        let err = sum.invoke(args((2,))).unwrap_err();
        assert!(matches!(
            err,
            Error::ArityMismatch { actual: 1, expected: 2, .. }
        ));
        assert_eq!(err.to_string(), "Function sum called with 1 arguments; expected 2");
        assert!(sum.invoke(args((1, 2, 3))).is_err());
    }

    #[test]
    fn type_mismatch_is_an_error() {
        let sum = BoundProcedure::new("sum", |a: i32, b: i32| a + b);
        let err = sum.invoke(args((2, "three"))).unwrap_err();
        match err {
            Error::TypeMismatch(msg) => assert!(msg.contains("argument 1 of sum"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn void_procedure_runs_for_side_effect() {
        let count = Arc::new(AtomicUsize::new(0));
        let bump = {
            let count = count.clone();
            BoundProcedure::new("bump", move |n: usize| {
                count.fetch_add(n, Ordering::Relaxed);
            })
        };
        assert_eq!(bump.invoke(args((4usize,))).unwrap(), Reply::Void);
        assert_eq!(count.load(Ordering::Relaxed), 4);
    }
}
