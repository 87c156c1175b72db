//! Wire serializers for notifier values.
//!
//! Every value a binding ships to the browser goes through [`Serializable`].
//! Primitives get a native impl with a stable type tag; anything else that
//! implements `serde::Serialize` goes through the [`Json`] fallback.

use std::ops::Deref;
use std::ops::DerefMut;

use serde::Serialize;
use serde_json::Number;
use serde_json::Value;

pub trait Serializable: Clone + Send + Sync + 'static {
    /// Tag rendered as `data-value-type`.
    const TYPE_TAG: &'static str;

    fn to_wire(&self) -> serde_json::Result<Value>;
}

macro_rules! int_serializable {
    ($($t:ty),*) => {
        $(
            impl Serializable for $t {
                const TYPE_TAG: &'static str = "int";

                fn to_wire(&self) -> serde_json::Result<Value> {
                    Ok(Value::from(*self))
                }
            }
        )*
    };
}

int_serializable!(i32, i64, u32, u64);

macro_rules! float_serializable {
    ($($t:ty),*) => {
        $(
            impl Serializable for $t {
                const TYPE_TAG: &'static str = "float";

                /// NaN and infinities have no JSON form and go out as `null`.
                fn to_wire(&self) -> serde_json::Result<Value> {
                    Ok(Number::from_f64(*self as f64).map(Value::Number).unwrap_or(Value::Null))
                }
            }
        )*
    };
}

float_serializable!(f32, f64);

impl Serializable for bool {
    const TYPE_TAG: &'static str = "bool";

    fn to_wire(&self) -> serde_json::Result<Value> {
        Ok(Value::Bool(*self))
    }
}

impl Serializable for String {
    const TYPE_TAG: &'static str = "string";

    fn to_wire(&self) -> serde_json::Result<Value> {
        Ok(Value::String(self.clone()))
    }
}

/// Generic fallback for composite values.
///
/// ```ignore
/// #[derive(Clone, Serialize)]
/// struct Cart { items: Vec<String>, total: f64 }
///
/// let cart = engine.notifier(Json(Cart { items: vec![], total: 0.0 }));
/// cart.update(|c| c.items.push("apple".into()));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Json<T>(pub T);

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> Serializable for Json<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    const TYPE_TAG: &'static str = "json";

    fn to_wire(&self) -> serde_json::Result<Value> {
        serde_json::to_value(&self.0)
    }
}
