//! The `Asset` trait and content-reference traversal
//!
//! Loaded objects are shared as `Arc<dyn Asset>`. Instead of reflecting over
//! fields, every asset type lists its content-reference edges through
//! [`Asset::visit_references`]; plain fields are owned by the asset and never
//! take part in reference counting.

use std::any::{Any, TypeId, type_name};
use std::sync::Arc;

use super::reference::{ContentReference, UntypedReference};

/// Conversion helpers to `Any`, implemented for every sized asset type
pub trait AsAny: Any + Send + Sync {
    /// Borrow as `Any`
    fn as_any(&self) -> &dyn Any;

    /// Convert a shared pointer into a shared `Any`
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Rust name of the concrete type
    fn asset_type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn asset_type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// An object that can be saved to and loaded from a content store.
///
/// # Example
///
/// ```ignore
/// struct Material {
///     albedo: ContentReference<Texture>,
///     layers: Vec<ContentReference<Texture>>,
/// }
///
/// impl Asset for Material {
///     fn visit_references<'a>(&'a self, visitor: &mut ReferenceVisitor<'a>) {
///         visitor.visit(&self.albedo);
///         visitor.visit_all(&self.layers);
///     }
/// }
/// ```
pub trait Asset: AsAny {
    /// Report every content reference held by this object, in a stable order
    fn visit_references<'a>(&'a self, visitor: &mut ReferenceVisitor<'a>) {
        let _ = visitor;
    }
}

impl dyn Asset {
    /// Runtime type of the concrete object
    #[must_use]
    pub fn concrete_type(&self) -> TypeId {
        self.as_any().type_id()
    }

    /// Rust name of the concrete object's type
    #[must_use]
    pub fn concrete_type_name(&self) -> &'static str {
        self.asset_type_name()
    }

    /// Borrow as the concrete type `T`
    #[must_use]
    pub fn downcast_ref<T: Asset>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Check whether the concrete type is `T`
    #[must_use]
    pub fn is<T: Asset>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Convert a shared asset into its concrete type
#[must_use]
pub fn downcast_arc<T: Asset>(object: Arc<dyn Asset>) -> Option<Arc<T>> {
    object.into_any().downcast::<T>().ok()
}

/// Collects the content-reference edges of an asset
#[derive(Default)]
pub struct ReferenceVisitor<'a> {
    edges: Vec<&'a dyn UntypedReference>,
}

impl<'a> ReferenceVisitor<'a> {
    /// Create an empty visitor
    #[must_use]
    pub fn new() -> Self {
        Self { edges: Vec::new() }
    }

    /// Visit a single reference field
    pub fn visit<T: Asset>(&mut self, reference: &'a ContentReference<T>) {
        self.edges.push(reference);
    }

    /// Visit an optional reference field
    pub fn visit_option<T: Asset>(&mut self, reference: &'a Option<ContentReference<T>>) {
        if let Some(reference) = reference {
            self.visit(reference);
        }
    }

    /// Visit every reference of a collection field
    pub fn visit_all<T, I>(&mut self, references: I)
    where
        T: Asset,
        I: IntoIterator<Item = &'a ContentReference<T>>,
    {
        for reference in references {
            self.visit(reference);
        }
    }

    /// Number of edges visited so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Check if no edge has been visited
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Consume the visitor, returning the visited edges
    #[must_use]
    pub fn into_edges(self) -> Vec<&'a dyn UntypedReference> {
        self.edges
    }
}

/// All content-reference edges of `asset`, in visiting order
#[must_use]
pub fn references_of(asset: &dyn Asset) -> Vec<&dyn UntypedReference> {
    let mut visitor = ReferenceVisitor::new();
    asset.visit_references(&mut visitor);
    visitor.into_edges()
}

/// Identity of a shared object, stable while any `Arc` to it is alive
#[must_use]
pub fn object_key<T: ?Sized>(object: &Arc<T>) -> usize {
    Arc::as_ptr(object).cast::<()>() as usize
}
