#![forbid(unsafe_code)]
//! The tag system (C2): symbol-keyed, schema-validated values attachable to
//! executors and readable from scopes, flow contexts, and value-lists — the
//! single typed channel for runtime configuration.
//!
//! §9 recommends that, in a nominally-typed language, the spec's three
//! structurally-probed source shapes (key-value store, tag-container
//! object, raw tag list) become an explicit `Source`-style classification
//! instead of duck typing. [`TagSource`] is that classifier: it is
//! implemented directly for the key-value store ([`TagMap`]) and for raw
//! lists (`[TaggedValue]` / `Vec<TaggedValue>`), and blanket-implemented for
//! anything exposing a `tags()` accessor ([`HasTags`], the container shape).

use crate::{
    error::RuntimeError,
    schema::{self, Schema},
};
use rustc_hash::FxHashMap;
use std::{
    any::Any,
    fmt,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

/// A unique, symbol-like key identifying a tag regardless of its (possibly
/// shared) display label.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagKey {
    id: u64,
    label: Option<&'static str>,
}

impl fmt::Debug for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label {
            Some(label) => write!(f, "TagKey({label}#{})", self.id),
            None => write!(f, "TagKey(#{})", self.id),
        }
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label {
            Some(label) => write!(f, "{label}"),
            None => write!(f, "#{}", self.id),
        }
    }
}

impl TagKey {
    fn next(label: Option<&'static str>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            label,
        }
    }

    /// Convenience accessor used by error reporting, which wants a
    /// `&'static str` rather than a `Display` impl.
    pub(crate) fn label_or_placeholder(&self) -> &'static str {
        self.label.unwrap_or("<tag>")
    }
}

/// A validated value attached under a [`TagKey`]. Type-erased so it can live
/// in homogeneous containers (tag lists, `FlowContext` stores); the owning
/// [`Tag<T>`] is the only thing that safely downcasts it back.
#[derive(Clone)]
pub struct TaggedValue {
    pub key: TagKey,
    value: Rc<dyn Any>,
}

impl fmt::Debug for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaggedValue({})", self.key)
    }
}

/// A key-value store source/sink: the first of the three shapes tags can be
/// read from and written to (§4.2, §9).
#[derive(Default, Clone)]
pub struct TagMap(FxHashMap<TagKey, TaggedValue>);

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: TaggedValue) {
        self.0.insert(value.key, value);
    }

    pub fn get_raw(&self, key: TagKey) -> Option<&TaggedValue> {
        self.0.get(&key)
    }
}

/// The tag-container object shape (§4.2): anything that exposes an ordered
/// list of tags, e.g. an executor's definition-time tags.
pub trait HasTags {
    fn tags(&self) -> &[TaggedValue];
}

/// The structural classifier described in §9: something tags can be probed
/// against, regardless of which of the three shapes it is.
pub trait TagSource {
    fn tag_values(&self, key: TagKey) -> Vec<TaggedValue>;
}

impl TagSource for TagMap {
    fn tag_values(&self, key: TagKey) -> Vec<TaggedValue> {
        self.0.get(&key).cloned().into_iter().collect()
    }
}

impl TagSource for [TaggedValue] {
    fn tag_values(&self, key: TagKey) -> Vec<TaggedValue> {
        self.iter().filter(|t| t.key == key).cloned().collect()
    }
}

impl TagSource for Vec<TaggedValue> {
    fn tag_values(&self, key: TagKey) -> Vec<TaggedValue> {
        self.as_slice().tag_values(key)
    }
}

impl<C: HasTags> TagSource for C {
    fn tag_values(&self, key: TagKey) -> Vec<TaggedValue> {
        self.tags().tag_values(key)
    }
}

/// `{ key, schema, label?, default? }` (§4.2): a symbol-keyed, schema-typed
/// tag factory/accessor.
pub struct Tag<T> {
    key: TagKey,
    schema: Rc<dyn Schema<T>>,
    default: Option<T>,
}

impl<T: Clone> Clone for Tag<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            schema: Rc::clone(&self.schema),
            default: self.default.clone(),
        }
    }
}

/// Options accepted by [`tag`].
#[derive(Default)]
pub struct TagOptions<T> {
    pub label: Option<&'static str>,
    pub default: Option<T>,
}

/// Creates a tag factory/accessor bound to `schema` (§4.2, §6's public
/// surface `tag(schema, options?)`).
pub fn tag<T: Clone + 'static>(schema: impl Schema<T> + 'static, options: TagOptions<T>) -> Tag<T>
where
    T: Clone,
{
    Tag {
        key: TagKey::next(options.label),
        schema: Rc::new(schema),
        default: options.default,
    }
}

impl<T: Clone + 'static> Tag<T> {
    pub fn key(&self) -> TagKey {
        self.key
    }

    /// Produces a tagged value, validating it against this tag's schema.
    /// With no argument, falls back to `default`; fails with
    /// `missing-value` if neither is present.
    pub fn make(&self, value: Option<T>) -> Result<TaggedValue, RuntimeError> {
        let value = value
            .or_else(|| self.default.clone())
            .ok_or(RuntimeError::MissingValue {
                key: self.key.label_or_placeholder(),
            })?;
        let validated = schema::validate(self.schema.as_ref(), value)?;
        Ok(TaggedValue {
            key: self.key,
            value: Rc::new(validated),
        })
    }

    /// `get(source)` (§4.2): returns the first matching value, falling back
    /// to `default`, failing with `not-found` if neither is present.
    pub fn get<S: TagSource + ?Sized>(&self, source: &S) -> Result<T, RuntimeError> {
        match source.tag_values(self.key).into_iter().next() {
            Some(tagged) => self.downcast(&tagged),
            None => self.default.clone().ok_or(RuntimeError::NotFound {
                key: self.key.label_or_placeholder(),
            }),
        }
    }

    /// `find(source)` (§4.2): like [`Tag::get`] but returns `None` instead
    /// of failing when absent and there is no default.
    pub fn find<S: TagSource + ?Sized>(&self, source: &S) -> Option<T> {
        self.get(source).ok()
    }

    /// `some(source)` (§4.2): every matching value, in source order.
    pub fn some<S: TagSource + ?Sized>(&self, source: &S) -> Vec<T> {
        source
            .tag_values(self.key)
            .iter()
            .filter_map(|tagged| self.downcast(tagged).ok())
            .collect()
    }

    /// `set(target, value)` for the key-value-store shape: validates and
    /// writes in place.
    pub fn set_in(&self, target: &mut TagMap, value: T) -> Result<(), RuntimeError> {
        target.insert(self.make(Some(value))?);
        Ok(())
    }

    /// `set(target, value)` for the tag-container/tag-list shapes: the core
    /// never mutates caller-owned arrays implicitly, so this validates and
    /// hands back a new tagged value for the caller to append.
    pub fn set_for_append(&self, value: T) -> Result<TaggedValue, RuntimeError> {
        self.make(Some(value))
    }

    /// `entry(value?)` (§4.2): `(key, validatedValue)` for seeding
    /// key-value stores.
    pub fn entry(&self, value: Option<T>) -> Result<TaggedValue, RuntimeError> {
        self.make(value)
    }

    /// Downcasts and re-validates against this tag's schema: validation
    /// occurs on every read as well as every write (§4.2), so a schema that
    /// narrows over time (or a value written before a schema change) is
    /// still caught at read time rather than only at `make`/`set`.
    fn downcast(&self, tagged: &TaggedValue) -> Result<T, RuntimeError> {
        let value = tagged
            .value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| RuntimeError::custom(format!("tag {} type mismatch", self.key)))?;
        schema::validate(self.schema.as_ref(), value)
    }
}

impl<T> fmt::Debug for Tag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.key)
    }
}
