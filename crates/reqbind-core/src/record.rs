//! Record declarations: the explicit descriptor table each target type
//! provides instead of runtime reflection.
//!
//! A target type implements [`Record`] by listing its bindable fields on a
//! [`Fields`] table. Each entry carries the structural field name, a plain
//! accessor closure, and optional annotations (alias, allowed locations).
//!
//! ```rust
//! use reqbind_core::{Fields, Location, Record};
//!
//! #[derive(Debug, Default)]
//! struct Image {
//!     url: String,
//!     caption: Option<String>,
//! }
//!
//! impl Record for Image {
//!     fn declare(fields: &mut Fields<Self>) {
//!         fields.scalar("url", |r| &mut r.url);
//!         fields.optional("caption", |r| &mut r.caption);
//!     }
//! }
//!
//! #[derive(Debug, Default)]
//! struct CreatePost {
//!     token: String,
//!     page: u32,
//!     images: Vec<Image>,
//! }
//!
//! impl Record for CreatePost {
//!     fn declare(fields: &mut Fields<Self>) {
//!         fields
//!             .scalar("token", |r| &mut r.token)
//!             .tag(Location::Header, "x-token");
//!         fields
//!             .scalar("page", |r| &mut r.page)
//!             .locations(&[Location::Query]);
//!         fields.records("images", |r| &mut r.images).name("imgs");
//!     }
//! }
//! ```

use crate::file::{FileHandle, FileOpenError, FileTarget};
use crate::leaf::{Leaf, LeafType};
use crate::location::Location;
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A statically declared target type that request values bind onto.
pub trait Record: Any + Send + Default {
    /// Registers every bindable field of the type.
    fn declare(fields: &mut Fields<Self>);
}

/// Type-erased field accessor: from a record (or field value) to one field.
pub(crate) type Accessor =
    Arc<dyn for<'a> Fn(&'a mut dyn Any) -> Option<&'a mut dyn Any> + Send + Sync>;

fn accessor<F>(f: F) -> Accessor
where
    F: for<'a> Fn(&'a mut dyn Any) -> Option<&'a mut dyn Any> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn erase<R, T, F>(get: F) -> Accessor
where
    R: Any,
    T: Any,
    F: Fn(&mut R) -> &mut T + Send + Sync + 'static,
{
    accessor(move |record| {
        record
            .downcast_mut::<R>()
            .map(|record| get(record) as &mut dyn Any)
    })
}

pub(crate) type AssignFn = fn(&mut dyn Any, Box<dyn Any + Send>) -> bool;
pub(crate) type ResetFn = fn(&mut dyn Any);
pub(crate) type ItemsFn = fn(&mut dyn Any, Vec<Box<dyn Any + Send>>) -> bool;
pub(crate) type MaterializeFn = fn(&mut dyn Any) -> Option<&mut dyn Any>;
pub(crate) type EnterFn = fn(&mut dyn Any, Option<usize>) -> Option<(usize, &mut dyn Any)>;
pub(crate) type FilesFn = fn(&mut dyn Any, &[FileHandle]) -> Result<(), FileOpenError>;

/// Identifies a record type and how to obtain its declarations.
#[derive(Clone, Copy)]
pub(crate) struct RecordType {
    pub(crate) id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) declare: fn() -> Vec<FieldDecl>,
}

impl RecordType {
    pub(crate) fn of<R: Record>() -> Self {
        Self {
            id: TypeId::of::<R>(),
            name: std::any::type_name::<R>(),
            declare: declarations::<R>,
        }
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

fn declarations<R: Record>() -> Vec<FieldDecl> {
    let mut fields = Fields::new();
    R::declare(&mut fields);
    fields.decls
}

/// How a declared field is written.
#[derive(Clone)]
pub(crate) enum Slot {
    Scalar {
        leaf: LeafType,
        optional: bool,
        assign: AssignFn,
        reset: ResetFn,
    },
    Sequence {
        leaf: LeafType,
        whole: TypeId,
        whole_name: &'static str,
        assign_items: ItemsFn,
        assign_whole: AssignFn,
    },
    Record {
        record: RecordType,
        materialize: MaterializeFn,
    },
    Records {
        record: RecordType,
        enter: EnterFn,
    },
    File {
        many: bool,
        assign: FilesFn,
    },
    Embedded {
        record: RecordType,
        materialize: MaterializeFn,
    },
}

impl Slot {
    pub(crate) fn shape(&self) -> FieldShape {
        match self {
            Self::Scalar {
                optional: false, ..
            } => FieldShape::Scalar,
            Self::Scalar { optional: true, .. } => FieldShape::OptionalScalar,
            Self::Sequence { .. } => FieldShape::Sequence,
            Self::Record { .. } | Self::Embedded { .. } => FieldShape::NestedRecord,
            Self::Records { .. } => FieldShape::SequenceOfRecords,
            Self::File { many: false, .. } => FieldShape::File,
            Self::File { many: true, .. } => FieldShape::SequenceOfFiles,
        }
    }

    pub(crate) fn child(&self) -> Option<RecordType> {
        match self {
            Self::Record { record, .. }
            | Self::Records { record, .. }
            | Self::Embedded { record, .. } => Some(*record),
            _ => None,
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Scalar { leaf, .. } => leaf.name,
            Self::Sequence { whole_name, .. } => *whole_name,
            Self::Record { record, .. }
            | Self::Records { record, .. }
            | Self::Embedded { record, .. } => record.name,
            Self::File { many: false, .. } => "file",
            Self::File { many: true, .. } => "files",
        }
    }
}

/// The closed set of field shapes the decoder dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldShape {
    /// A plain leaf value, `T`.
    Scalar,
    /// An optional leaf value, `Option<T>`.
    OptionalScalar,
    /// A sequence of leaf values, `Vec<T>`.
    Sequence,
    /// A nested record, inline or boxed.
    NestedRecord,
    /// A sequence of nested records, addressed by index.
    SequenceOfRecords,
    /// A single uploaded file.
    File,
    /// Several uploaded files.
    SequenceOfFiles,
}

/// One declared field plus its annotations.
///
/// Returned by the [`Fields`] constructors; the annotation methods chain.
pub struct FieldDecl {
    pub(crate) name: &'static str,
    pub(crate) alias: Option<String>,
    pub(crate) locations: Option<Vec<Location>>,
    pub(crate) tag: Option<(Location, String)>,
    pub(crate) skip: bool,
    pub(crate) not_in_body: bool,
    pub(crate) slot: Slot,
    pub(crate) access: Option<Accessor>,
}

impl FieldDecl {
    fn new(name: &'static str, slot: Slot, access: Option<Accessor>) -> Self {
        Self {
            name,
            alias: None,
            locations: None,
            tag: None,
            skip: false,
            not_in_body: false,
            slot,
            access,
        }
    }

    /// Sets the external name the field answers to.
    pub fn name(&mut self, alias: impl Into<String>) -> &mut Self {
        let alias = alias.into();
        if alias == "-" {
            self.skip = true;
        } else {
            self.alias = Some(alias);
        }
        self
    }

    /// Restricts the locations the field may be supplied from.
    ///
    /// An empty list inherits the enclosing embedded record's locations, or
    /// falls back to the body.
    pub fn locations(&mut self, locations: &[Location]) -> &mut Self {
        let mut list = Vec::with_capacity(locations.len());
        for location in locations {
            if !list.contains(location) {
                list.push(*location);
            }
        }
        self.locations = Some(list);
        self
    }

    /// Declares an explicit but empty location list.
    pub fn inherit_locations(&mut self) -> &mut Self {
        self.locations(&[])
    }

    /// Binds the field to exactly one location under `alias`.
    ///
    /// Takes precedence over [`FieldDecl::name`] and [`FieldDecl::locations`].
    pub fn tag(&mut self, location: Location, alias: impl Into<String>) -> &mut Self {
        self.tag = Some((location, alias.into()));
        self
    }

    /// Excludes the field from decoding.
    pub fn skip(&mut self) -> &mut Self {
        self.skip = true;
        self
    }

    /// Removes the body from the field's candidate locations.
    ///
    /// A field left with no location is excluded.
    pub fn not_in_body(&mut self) -> &mut Self {
        self.not_in_body = true;
        self
    }

    /// Returns the field's shape.
    #[must_use]
    pub fn shape(&self) -> FieldShape {
        self.slot.shape()
    }
}

impl fmt::Debug for FieldDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDecl")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("locations", &self.locations)
            .field("tag", &self.tag)
            .field("shape", &self.shape())
            .finish_non_exhaustive()
    }
}

/// Declaration table filled in by [`Record::declare`].
pub struct Fields<R> {
    decls: Vec<FieldDecl>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Fields<R> {
    fn new() -> Self {
        Self {
            decls: Vec::new(),
            _record: PhantomData,
        }
    }

    fn push(&mut self, decl: FieldDecl) -> &mut FieldDecl {
        self.decls.push(decl);
        let last = self.decls.len() - 1;
        &mut self.decls[last]
    }

    /// Declares a leaf field of type `T`.
    pub fn scalar<T, F>(&mut self, name: &'static str, get: F) -> &mut FieldDecl
    where
        T: Leaf,
        F: Fn(&mut R) -> &mut T + Send + Sync + 'static,
    {
        let slot = Slot::Scalar {
            leaf: LeafType::of::<T>(),
            optional: false,
            assign: assign_value::<T>,
            reset: reset_value::<T>,
        };
        self.push(FieldDecl::new(name, slot, Some(erase(get))))
    }

    /// Declares an optional leaf field, `Option<T>`.
    pub fn optional<T, F>(&mut self, name: &'static str, get: F) -> &mut FieldDecl
    where
        T: Leaf,
        F: Fn(&mut R) -> &mut Option<T> + Send + Sync + 'static,
    {
        let slot = Slot::Scalar {
            leaf: LeafType::of::<T>(),
            optional: true,
            assign: assign_optional::<T>,
            reset: reset_optional::<T>,
        };
        self.push(FieldDecl::new(name, slot, Some(erase(get))))
    }

    /// Declares a sequence of leaf values, `Vec<T>`.
    pub fn list<T, F>(&mut self, name: &'static str, get: F) -> &mut FieldDecl
    where
        T: Leaf,
        F: Fn(&mut R) -> &mut Vec<T> + Send + Sync + 'static,
    {
        let slot = Slot::Sequence {
            leaf: LeafType::of::<T>(),
            whole: TypeId::of::<Vec<T>>(),
            whole_name: std::any::type_name::<Vec<T>>(),
            assign_items: assign_items::<T>,
            assign_whole: assign_value::<Vec<T>>,
        };
        self.push(FieldDecl::new(name, slot, Some(erase(get))))
    }

    /// Declares an inline nested record.
    pub fn record<C, F>(&mut self, name: &'static str, get: F) -> &mut FieldDecl
    where
        C: Record,
        F: Fn(&mut R) -> &mut C + Send + Sync + 'static,
    {
        let slot = Slot::Record {
            record: RecordType::of::<C>(),
            materialize: materialize_inline,
        };
        self.push(FieldDecl::new(name, slot, Some(erase(get))))
    }

    /// Declares a nested record allocated on first write, `Option<Box<C>>`.
    pub fn boxed<C, F>(&mut self, name: &'static str, get: F) -> &mut FieldDecl
    where
        C: Record,
        F: Fn(&mut R) -> &mut Option<Box<C>> + Send + Sync + 'static,
    {
        let slot = Slot::Record {
            record: RecordType::of::<C>(),
            materialize: materialize_boxed::<C>,
        };
        self.push(FieldDecl::new(name, slot, Some(erase(get))))
    }

    /// Declares a sequence of nested records, `Vec<C>`, addressed by index.
    pub fn records<C, F>(&mut self, name: &'static str, get: F) -> &mut FieldDecl
    where
        C: Record,
        F: Fn(&mut R) -> &mut Vec<C> + Send + Sync + 'static,
    {
        let slot = Slot::Records {
            record: RecordType::of::<C>(),
            enter: enter_item::<C>,
        };
        self.push(FieldDecl::new(name, slot, Some(erase(get))))
    }

    /// Declares an embedded record whose fields are promoted into this one.
    pub fn embed<C, F>(&mut self, name: &'static str, get: F) -> &mut FieldDecl
    where
        C: Record,
        F: Fn(&mut R) -> &mut C + Send + Sync + 'static,
    {
        let slot = Slot::Embedded {
            record: RecordType::of::<C>(),
            materialize: materialize_inline,
        };
        self.push(FieldDecl::new(name, slot, Some(erase(get))))
    }

    /// Declares an upload field of one of the [`FileTarget`] shapes.
    pub fn file<T, F>(&mut self, name: &'static str, get: F) -> &mut FieldDecl
    where
        T: FileTarget,
        F: Fn(&mut R) -> &mut T + Send + Sync + 'static,
    {
        let slot = Slot::File {
            many: T::MANY,
            assign: assign_files::<T>,
        };
        self.push(FieldDecl::new(name, slot, Some(erase(get))))
    }

    /// Declares a leaf field that resolves but is never written.
    ///
    /// Keys addressing it are authorized like any other field; the write is
    /// a silent no-op.
    pub fn reserved<T: Leaf>(&mut self, name: &'static str) -> &mut FieldDecl {
        let slot = Slot::Scalar {
            leaf: LeafType::of::<T>(),
            optional: false,
            assign: assign_value::<T>,
            reset: reset_value::<T>,
        };
        self.push(FieldDecl::new(name, slot, None))
    }
}

fn assign_value<T: Any>(slot: &mut dyn Any, value: Box<dyn Any + Send>) -> bool {
    match (slot.downcast_mut::<T>(), value.downcast::<T>()) {
        (Some(slot), Ok(value)) => {
            *slot = *value;
            true
        }
        _ => false,
    }
}

fn reset_value<T: Any + Default>(slot: &mut dyn Any) {
    if let Some(slot) = slot.downcast_mut::<T>() {
        *slot = T::default();
    }
}

fn assign_optional<T: Any>(slot: &mut dyn Any, value: Box<dyn Any + Send>) -> bool {
    match (slot.downcast_mut::<Option<T>>(), value.downcast::<T>()) {
        (Some(slot), Ok(value)) => {
            *slot = Some(*value);
            true
        }
        _ => false,
    }
}

fn reset_optional<T: Any>(slot: &mut dyn Any) {
    if let Some(slot) = slot.downcast_mut::<Option<T>>() {
        *slot = None;
    }
}

fn assign_items<T: Any>(slot: &mut dyn Any, items: Vec<Box<dyn Any + Send>>) -> bool {
    let Some(slot) = slot.downcast_mut::<Vec<T>>() else {
        return false;
    };
    let mut values = Vec::with_capacity(items.len());
    for item in items {
        match item.downcast::<T>() {
            Ok(value) => values.push(*value),
            Err(_) => return false,
        }
    }
    *slot = values;
    true
}

fn materialize_inline(slot: &mut dyn Any) -> Option<&mut dyn Any> {
    Some(slot)
}

fn materialize_boxed<C: Record>(slot: &mut dyn Any) -> Option<&mut dyn Any> {
    let boxed = slot.downcast_mut::<Option<Box<C>>>()?;
    Some(boxed.get_or_insert_with(Box::default).as_mut() as &mut dyn Any)
}

fn enter_item<C: Record>(
    slot: &mut dyn Any,
    position: Option<usize>,
) -> Option<(usize, &mut dyn Any)> {
    let items = slot.downcast_mut::<Vec<C>>()?;
    let position = match position {
        Some(position) => position,
        None => {
            items.push(C::default());
            items.len() - 1
        }
    };
    items
        .get_mut(position)
        .map(|item| (position, item as &mut dyn Any))
}

fn assign_files<T: FileTarget>(slot: &mut dyn Any, files: &[FileHandle]) -> Result<(), FileOpenError> {
    match slot.downcast_mut::<T>() {
        Some(slot) => slot.assign(files),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Child {
        n: i32,
    }

    impl Record for Child {
        fn declare(fields: &mut Fields<Self>) {
            fields.scalar("n", |r| &mut r.n);
        }
    }

    #[derive(Debug, Default)]
    struct Parent {
        id: u64,
        note: Option<String>,
        tags: Vec<String>,
        child: Child,
        later: Option<Box<Child>>,
        children: Vec<Child>,
        uploads: Vec<FileHandle>,
    }

    impl Record for Parent {
        fn declare(fields: &mut Fields<Self>) {
            fields
                .scalar("id", |r| &mut r.id)
                .locations(&[Location::Path, Location::Path]);
            fields.optional("note", |r| &mut r.note).name("-");
            fields.list("tags", |r| &mut r.tags).name("tag");
            fields.record("child", |r| &mut r.child);
            fields.boxed("later", |r| &mut r.later);
            fields.records("children", |r| &mut r.children);
            fields.file("uploads", |r| &mut r.uploads);
            fields.reserved::<String>("internal").not_in_body();
        }
    }

    fn decls() -> Vec<FieldDecl> {
        (RecordType::of::<Parent>().declare)()
    }

    fn access<'a>(decl: &FieldDecl, record: &'a mut Parent) -> &'a mut dyn Any {
        let access = decl.access.as_ref().unwrap();
        access(record as &mut dyn Any).unwrap()
    }

    #[test]
    fn test_declaration_shapes() {
        let shapes: Vec<FieldShape> = decls().iter().map(FieldDecl::shape).collect();
        assert_eq!(
            shapes,
            vec![
                FieldShape::Scalar,
                FieldShape::OptionalScalar,
                FieldShape::Sequence,
                FieldShape::NestedRecord,
                FieldShape::NestedRecord,
                FieldShape::SequenceOfRecords,
                FieldShape::SequenceOfFiles,
                FieldShape::Scalar,
            ]
        );
    }

    #[test]
    fn test_annotations() {
        let decls = decls();
        assert_eq!(decls[0].locations, Some(vec![Location::Path]));
        assert!(decls[1].skip);
        assert_eq!(decls[2].alias.as_deref(), Some("tag"));
        assert!(decls[7].access.is_none());
        assert!(decls[7].not_in_body);
    }

    #[test]
    fn test_assign_through_accessors() {
        let decls = decls();
        let mut parent = Parent::default();

        let Slot::Scalar { assign, .. } = &decls[0].slot else {
            panic!("scalar slot expected");
        };
        assert!(assign(access(&decls[0], &mut parent), Box::new(7u64)));
        assert!(!assign(access(&decls[0], &mut parent), Box::new(7i32)));
        assert_eq!(parent.id, 7);

        let Slot::Sequence { assign_items, .. } = &decls[2].slot else {
            panic!("sequence slot expected");
        };
        let items: Vec<Box<dyn Any + Send>> = vec![Box::new("a".to_string()), Box::new("b".to_string())];
        assert!(assign_items(access(&decls[2], &mut parent), items));
        assert_eq!(parent.tags, vec!["a", "b"]);
    }

    #[test]
    fn test_boxed_record_materializes() {
        let decls = decls();
        let mut parent = Parent::default();
        let Slot::Record { materialize, .. } = &decls[4].slot else {
            panic!("record slot expected");
        };
        let child = materialize(access(&decls[4], &mut parent)).unwrap();
        child.downcast_mut::<Child>().unwrap().n = 3;
        assert_eq!(parent.later, Some(Box::new(Child { n: 3 })));
    }

    #[test]
    fn test_enter_sequence_item() {
        let decls = decls();
        let mut parent = Parent::default();
        let Slot::Records { enter, .. } = &decls[5].slot else {
            panic!("records slot expected");
        };
        let (first, _) = enter(access(&decls[5], &mut parent), None).unwrap();
        let (second, _) = enter(access(&decls[5], &mut parent), None).unwrap();
        let (again, item) = enter(access(&decls[5], &mut parent), Some(first)).unwrap();
        item.downcast_mut::<Child>().unwrap().n = 9;
        assert_eq!((first, second, again), (0, 1, 0));
        assert_eq!(parent.children, vec![Child { n: 9 }, Child { n: 0 }]);
        assert!(enter(access(&decls[5], &mut parent), Some(5)).is_none());
    }
}
