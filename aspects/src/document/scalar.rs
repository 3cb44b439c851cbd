use super::{NodeMut, NodeRef};

/// A value stored directly in one node.
///
/// Integers of every width share the node's single `i64` slot and are
/// narrowed on the way out; a read that doesn't fit the target type yields
/// `None`. `u64` values above `i64::MAX` are stored as decimal strings so they
/// survive the trip. Booleans are integers `0`/`1`.
pub trait Scalar: Sized {
    fn store(self, node: &mut NodeMut<'_>);

    fn load(node: NodeRef<'_>) -> Option<Self>;
}

macro_rules! narrow_integers {
    ($($t:ty),*) => {$(
        impl Scalar for $t {
            fn store(self, node: &mut NodeMut<'_>) {
                node.set_int(i64::from(self));
            }

            fn load(node: NodeRef<'_>) -> Option<Self> {
                node.as_int().and_then(|value| <$t>::try_from(value).ok())
            }
        }
    )*};
}

narrow_integers!(i8, i16, i32, i64, u8, u16, u32);

impl Scalar for u64 {
    fn store(self, node: &mut NodeMut<'_>) {
        match i64::try_from(self) {
            Ok(value) => node.set_int(value),
            Err(_) => node.set_str(self.to_string()),
        }
    }

    fn load(node: NodeRef<'_>) -> Option<Self> {
        match node.as_int() {
            Some(value) => u64::try_from(value).ok(),
            None => node.as_str().and_then(|text| text.parse().ok()),
        }
    }
}

impl Scalar for usize {
    fn store(self, node: &mut NodeMut<'_>) {
        (self as u64).store(node)
    }

    fn load(node: NodeRef<'_>) -> Option<Self> {
        u64::load(node).and_then(|value| usize::try_from(value).ok())
    }
}

impl Scalar for bool {
    fn store(self, node: &mut NodeMut<'_>) {
        node.set_int(i64::from(self));
    }

    fn load(node: NodeRef<'_>) -> Option<Self> {
        match node.as_int() {
            Some(value) => Some(value != 0),
            None => match node.as_str()? {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
        }
    }
}

impl Scalar for f64 {
    fn store(self, node: &mut NodeMut<'_>) {
        node.set_float(self);
    }

    fn load(node: NodeRef<'_>) -> Option<Self> {
        node.as_float()
            .or_else(|| node.as_int().map(|value| value as f64))
    }
}

impl Scalar for f32 {
    fn store(self, node: &mut NodeMut<'_>) {
        node.set_float(f64::from(self));
    }

    fn load(node: NodeRef<'_>) -> Option<Self> {
        f64::load(node).map(|value| value as f32)
    }
}

impl Scalar for String {
    fn store(self, node: &mut NodeMut<'_>) {
        node.set_str(self);
    }

    fn load(node: NodeRef<'_>) -> Option<Self> {
        node.as_str().map(str::to_owned)
    }
}

impl Scalar for &str {
    fn store(self, node: &mut NodeMut<'_>) {
        node.set_str(self);
    }

    fn load(_: NodeRef<'_>) -> Option<Self> {
        None
    }
}
