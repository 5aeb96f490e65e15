//! Attribute and model metadata declarations
//!
//! One [`AttributeMetadata`] describes how a single attribute behaves for
//! filtering, sorting, reading and writing; one [`ModelMetadata`] carries the
//! per-type settings (id combinations, hooks, eager loads). Both are built
//! fluently and merged field-by-field when the same type (or a subtype) is
//! declared more than once.
//!
//! # Example
//!
//! ```rust,ignore
//! let isbn = AttributeMetadata::new("isbn")
//!     .filterable()
//!     .sortable()
//!     .id()
//!     .parse(transforms::digits_only());
//! ```

use serde_json::Value;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use super::context::RequestContext;
use super::entity::Entity;
use super::error::{AttributeError, AttributeErrorKind};
use super::operation::{Operation, SortDirection};

/// A shared, type-erased callback slot
pub struct Callback<F: ?Sized>(pub Arc<F>);

impl<F: ?Sized> Clone for Callback<F> {
    fn clone(&self) -> Self {
        Callback(self.0.clone())
    }
}

impl<F: ?Sized> fmt::Debug for Callback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback")
    }
}

impl<F: ?Sized> Deref for Callback<F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.0
    }
}

/// Inbound/outbound value coercion
pub type Transform =
    Callback<dyn Fn(Value, &RequestContext) -> anyhow::Result<Value> + Send + Sync>;

/// Computes an attribute's value from the entity
pub type ValueFn = Callback<dyn Fn(&dyn Entity, &RequestContext) -> Value + Send + Sync>;

/// Writes an attribute in place of the entity's own field setter
pub type Setter = Callback<
    dyn Fn(&mut dyn Entity, Value, &RequestContext) -> Result<(), AttributeError> + Send + Sync,
>;

/// Lifecycle hook; reports problems through the entity's errors
pub type Hook = Callback<dyn Fn(&mut dyn Entity, &RequestContext) + Send + Sync>;

/// Build a [`Transform`] from a closure
pub fn transform<F>(f: F) -> Transform
where
    F: Fn(Value, &RequestContext) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Callback(Arc::new(f))
}

/// Build a [`Hook`] from a closure
pub fn hook<F>(f: F) -> Hook
where
    F: Fn(&mut dyn Entity, &RequestContext) + Send + Sync + 'static,
{
    Callback(Arc::new(f))
}

// ============================================================================
// Flags and selectors
// ============================================================================

/// A boolean setting, fixed or evaluated against the request
#[derive(Clone)]
pub enum Flag {
    Fixed(bool),
    When(Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>),
}

impl Flag {
    pub fn when<F>(f: F) -> Self
    where
        F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
    {
        Flag::When(Arc::new(f))
    }

    pub fn eval(&self, ctx: &RequestContext) -> bool {
        match self {
            Flag::Fixed(value) => *value,
            Flag::When(f) => f(ctx),
        }
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        Flag::Fixed(value)
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flag::Fixed(value) => write!(f, "Fixed({})", value),
            Flag::When(_) => f.write_str("When(..)"),
        }
    }
}

fn flag_set(flag: &Option<Flag>, ctx: &RequestContext) -> bool {
    flag.as_ref().is_some_and(|f| f.eval(ctx))
}

/// Matches operations or action names
#[derive(Clone)]
pub enum Selector<T> {
    /// Matches any listed value
    Set(Vec<T>),
    /// Matches listed values whose flag evaluates true
    Map(Vec<(T, Flag)>),
    When(Arc<dyn Fn(&T, &RequestContext) -> bool + Send + Sync>),
}

impl<T: PartialEq> Selector<T> {
    pub fn matches(&self, value: &T, ctx: &RequestContext) -> bool {
        match self {
            Selector::Set(values) => values.contains(value),
            Selector::Map(entries) => entries
                .iter()
                .find(|(candidate, _)| candidate == value)
                .is_some_and(|(_, flag)| flag.eval(ctx)),
            Selector::When(f) => f(value, ctx),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Selector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Set(values) => f.debug_tuple("Set").field(values).finish(),
            Selector::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Selector::When(_) => f.write_str("When(..)"),
        }
    }
}

// ============================================================================
// Associations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// How an association attribute maps onto the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationInfo {
    pub target_type: String,
    pub cardinality: Cardinality,
    pub foreign_key: String,
    pub inverse: Option<String>,
    /// This side holds the physical key (e.g. `book.author_id`)
    pub owns_foreign_key: bool,
}

impl AssociationInfo {
    /// To-one where this side holds the key
    pub fn belongs_to(target_type: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            cardinality: Cardinality::ToOne,
            foreign_key: foreign_key.into(),
            inverse: None,
            owns_foreign_key: true,
        }
    }

    /// To-one where the target holds the key back to this side
    pub fn has_one(target_type: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            cardinality: Cardinality::ToOne,
            owns_foreign_key: false,
            ..Self::belongs_to(target_type, foreign_key)
        }
    }

    pub fn has_many(target_type: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            cardinality: Cardinality::ToMany,
            owns_foreign_key: false,
            ..Self::belongs_to(target_type, foreign_key)
        }
    }

    pub fn with_inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }
}

/// What kind of attribute this is, with its association details
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeBehavior {
    Plain,
    ToOne(AssociationInfo),
    ToMany(AssociationInfo),
}

static PLAIN: AttributeBehavior = AttributeBehavior::Plain;

impl AttributeBehavior {
    pub fn from_association(info: AssociationInfo) -> Self {
        match info.cardinality {
            Cardinality::ToOne => AttributeBehavior::ToOne(info),
            Cardinality::ToMany => AttributeBehavior::ToMany(info),
        }
    }

    pub fn association(&self) -> Option<&AssociationInfo> {
        match self {
            AttributeBehavior::Plain => None,
            AttributeBehavior::ToOne(info) | AttributeBehavior::ToMany(info) => Some(info),
        }
    }

    pub fn is_association(&self) -> bool {
        self.association().is_some()
    }
}

// ============================================================================
// Exception policy
// ============================================================================

/// Selects which attribute errors a handler applies to
#[derive(Clone)]
pub enum ErrorMatcher {
    Any,
    Kind(AttributeErrorKind),
    When(Arc<dyn Fn(&AttributeError) -> bool + Send + Sync>),
}

impl ErrorMatcher {
    pub fn matches(&self, error: &AttributeError) -> bool {
        match self {
            ErrorMatcher::Any => true,
            ErrorMatcher::Kind(kind) => error.kind() == *kind,
            ErrorMatcher::When(f) => f(error),
        }
    }
}

impl fmt::Debug for ErrorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorMatcher::Any => f.write_str("Any"),
            ErrorMatcher::Kind(kind) => write!(f, "Kind({:?})", kind),
            ErrorMatcher::When(_) => f.write_str("When(..)"),
        }
    }
}

/// What to do when a matched attribute error occurs
#[derive(Clone)]
pub enum ExceptionHandler {
    Callback(Arc<dyn Fn(&mut dyn Entity, &AttributeError, &RequestContext) + Send + Sync>),
    /// Record this message as a validation error on the attribute
    Message(String),
    /// Record the payload field as ignored
    Ignore,
}

impl fmt::Debug for ExceptionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionHandler::Callback(_) => f.write_str("Callback(..)"),
            ExceptionHandler::Message(message) => write!(f, "Message({:?})", message),
            ExceptionHandler::Ignore => f.write_str("Ignore"),
        }
    }
}

/// Where a rendered value comes from when it is not a plain field read
#[derive(Debug, Clone)]
pub enum ValueSource {
    Literal(Value),
    Computed(ValueFn),
}

// ============================================================================
// Attribute metadata
// ============================================================================

/// Declared behavior of one attribute
///
/// Unset (`None`) fields fall back to defaults and are overridden by later
/// declarations during [`AttributeMetadata::merge`].
#[derive(Debug, Clone, Default)]
pub struct AttributeMetadata {
    pub key: String,
    pub alias: Option<String>,
    pub filter: Option<Flag>,
    pub sort: Option<Flag>,
    pub read_only: Option<Flag>,
    pub write_only: Option<Flag>,
    pub admin_only: Option<Flag>,
    pub admin_content: Option<Flag>,
    pub only: Option<Selector<Operation>>,
    pub except: Option<Selector<Operation>>,
    pub only_actions: Option<Selector<String>>,
    pub except_actions: Option<Selector<String>>,
    pub parse: Option<Transform>,
    pub render: Option<Transform>,
    /// Field read on the attribute's value before rendering
    pub render_method: Option<String>,
    pub value: Option<ValueSource>,
    pub setter: Option<Setter>,
    pub behavior: Option<AttributeBehavior>,
    pub on_exception: Vec<(ErrorMatcher, ExceptionHandler)>,
    pub default_sort: Option<SortDirection>,
    pub filter_delimiter: Option<String>,
    pub id: Option<bool>,
    pub hide_when_null: Option<bool>,
    /// Subset of the nested entity's attributes to render
    pub attributes: Option<Vec<String>>,
    /// Nested entity attributes never rendered through this attribute
    pub except_attributes: Option<Vec<String>>,
}

impl AttributeMetadata {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// A read-only attribute whose value is a fixed literal
    pub fn literal(key: impl Into<String>, value: Value) -> Self {
        Self::new(key).value(ValueSource::Literal(value)).read_only()
    }

    /// A read-only attribute computed from the entity
    pub fn computed<F>(key: impl Into<String>, f: F) -> Self
    where
        F: Fn(&dyn Entity, &RequestContext) -> Value + Send + Sync + 'static,
    {
        Self::new(key)
            .value(ValueSource::Computed(Callback(Arc::new(f))))
            .read_only()
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn filterable(self) -> Self {
        self.filter_when(true)
    }

    pub fn filter_when(mut self, flag: impl Into<Flag>) -> Self {
        self.filter = Some(flag.into());
        self
    }

    pub fn sortable(self) -> Self {
        self.sort_when(true)
    }

    pub fn sort_when(mut self, flag: impl Into<Flag>) -> Self {
        self.sort = Some(flag.into());
        self
    }

    pub fn read_only(self) -> Self {
        self.read_only_when(true)
    }

    pub fn read_only_when(mut self, flag: impl Into<Flag>) -> Self {
        self.read_only = Some(flag.into());
        self
    }

    pub fn write_only(self) -> Self {
        self.write_only_when(true)
    }

    pub fn write_only_when(mut self, flag: impl Into<Flag>) -> Self {
        self.write_only = Some(flag.into());
        self
    }

    pub fn admin_only(mut self) -> Self {
        self.admin_only = Some(Flag::Fixed(true));
        self
    }

    pub fn admin_content(mut self) -> Self {
        self.admin_content = Some(Flag::Fixed(true));
        self
    }

    pub fn only(mut self, operations: impl IntoIterator<Item = Operation>) -> Self {
        self.only = Some(Selector::Set(operations.into_iter().collect()));
        self
    }

    pub fn except(mut self, operations: impl IntoIterator<Item = Operation>) -> Self {
        self.except = Some(Selector::Set(operations.into_iter().collect()));
        self
    }

    pub fn only_when(mut self, selector: Selector<Operation>) -> Self {
        self.only = Some(selector);
        self
    }

    pub fn except_when(mut self, selector: Selector<Operation>) -> Self {
        self.except = Some(selector);
        self
    }

    pub fn only_actions(mut self, selector: Selector<String>) -> Self {
        self.only_actions = Some(selector);
        self
    }

    pub fn except_actions(mut self, selector: Selector<String>) -> Self {
        self.except_actions = Some(selector);
        self
    }

    pub fn parse(mut self, transform: Transform) -> Self {
        self.parse = Some(transform);
        self
    }

    pub fn render(mut self, transform: Transform) -> Self {
        self.render = Some(transform);
        self
    }

    pub fn render_method(mut self, field: impl Into<String>) -> Self {
        self.render_method = Some(field.into());
        self
    }

    pub fn value(mut self, source: ValueSource) -> Self {
        self.value = Some(source);
        self
    }

    pub fn setter<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut dyn Entity, Value, &RequestContext) -> Result<(), AttributeError>
            + Send
            + Sync
            + 'static,
    {
        self.setter = Some(Callback(Arc::new(f)));
        self
    }

    pub fn plain(mut self) -> Self {
        self.behavior = Some(AttributeBehavior::Plain);
        self
    }

    pub fn association(mut self, info: AssociationInfo) -> Self {
        self.behavior = Some(AttributeBehavior::from_association(info));
        self
    }

    pub fn on_exception(mut self, matcher: ErrorMatcher, handler: ExceptionHandler) -> Self {
        self.on_exception.push((matcher, handler));
        self
    }

    pub fn default_sort(mut self, direction: SortDirection) -> Self {
        self.default_sort = Some(direction);
        self
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.filter_delimiter = Some(delimiter.into());
        self
    }

    /// Mark as part of the natural key used to match nested payloads
    pub fn id(mut self) -> Self {
        self.id = Some(true);
        self
    }

    pub fn hide_when_null(mut self) -> Self {
        self.hide_when_null = Some(true);
        self
    }

    pub fn nested_attributes<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn nested_except<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.except_attributes = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    // === Resolved accessors ===

    pub fn behavior(&self) -> &AttributeBehavior {
        self.behavior.as_ref().unwrap_or(&PLAIN)
    }

    pub fn association_info(&self) -> Option<&AssociationInfo> {
        self.behavior().association()
    }

    /// Name before case conversion: the alias if declared, else the key
    pub fn base_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.key)
    }

    pub fn delimiter_or_default(&self) -> &str {
        self.filter_delimiter.as_deref().unwrap_or(",")
    }

    pub fn is_id(&self) -> bool {
        self.id.unwrap_or(false)
    }

    pub fn hides_when_null(&self) -> bool {
        self.hide_when_null.unwrap_or(false)
    }

    /// The attribute's current value on `entity`
    ///
    /// A declared literal or computed source takes precedence over the field.
    pub fn read(&self, entity: &dyn Entity, ctx: &RequestContext) -> Value {
        match &self.value {
            Some(ValueSource::Literal(value)) => value.clone(),
            Some(ValueSource::Computed(f)) => f(entity, ctx),
            None => entity.field(&self.key).unwrap_or(Value::Null),
        }
    }

    /// Whether the attribute takes part in `operation` for this request
    ///
    /// Rules apply in order: admin gating, admin content, filter/sort
    /// flags, read/write restrictions, operation and action selectors, then
    /// the caller's explicit key filters.
    pub fn is_visible(&self, operation: Operation, ctx: &RequestContext) -> bool {
        if flag_set(&self.admin_only, ctx) && !ctx.admin {
            if !operation.is_write() || !ctx.admin_user {
                return false;
            }
        }
        if flag_set(&self.admin_content, ctx) && !ctx.admin_content {
            return false;
        }

        match operation {
            Operation::Filter => return flag_set(&self.filter, ctx),
            Operation::Sort => return flag_set(&self.sort, ctx),
            _ => {}
        }

        if operation.is_write() {
            if flag_set(&self.read_only, ctx) {
                return false;
            }
        } else if flag_set(&self.write_only, ctx) {
            return false;
        }

        if let Some(only) = &self.only {
            if !only.matches(&operation, ctx) {
                return false;
            }
        }
        if let Some(except) = &self.except {
            if except.matches(&operation, ctx) {
                return false;
            }
        }
        if let Some(only_actions) = &self.only_actions {
            let matched = ctx
                .action
                .as_ref()
                .is_some_and(|action| only_actions.matches(action, ctx));
            if !matched {
                return false;
            }
        }
        if let Some(except_actions) = &self.except_actions {
            let matched = ctx
                .action
                .as_ref()
                .is_some_and(|action| except_actions.matches(action, ctx));
            if matched {
                return false;
            }
        }

        if let Some(only) = &ctx.only {
            if !only.contains(&self.key) {
                return false;
            }
        }
        if ctx.except.contains(&self.key) {
            return false;
        }
        if self.behavior().is_association() && ctx.exclude_associations.contains(&self.key) {
            return false;
        }
        true
    }

    /// Overlay `over` onto `self`: every field `over` sets wins
    pub fn merge(self, over: AttributeMetadata) -> Self {
        Self {
            key: self.key,
            alias: over.alias.or(self.alias),
            filter: over.filter.or(self.filter),
            sort: over.sort.or(self.sort),
            read_only: over.read_only.or(self.read_only),
            write_only: over.write_only.or(self.write_only),
            admin_only: over.admin_only.or(self.admin_only),
            admin_content: over.admin_content.or(self.admin_content),
            only: over.only.or(self.only),
            except: over.except.or(self.except),
            only_actions: over.only_actions.or(self.only_actions),
            except_actions: over.except_actions.or(self.except_actions),
            parse: over.parse.or(self.parse),
            render: over.render.or(self.render),
            render_method: over.render_method.or(self.render_method),
            value: over.value.or(self.value),
            setter: over.setter.or(self.setter),
            behavior: over.behavior.or(self.behavior),
            on_exception: if over.on_exception.is_empty() {
                self.on_exception
            } else {
                over.on_exception
            },
            default_sort: over.default_sort.or(self.default_sort),
            filter_delimiter: over.filter_delimiter.or(self.filter_delimiter),
            id: over.id.or(self.id),
            hide_when_null: over.hide_when_null.or(self.hide_when_null),
            attributes: over.attributes.or(self.attributes),
            except_attributes: over.except_attributes.or(self.except_attributes),
        }
    }
}

// ============================================================================
// Model metadata
// ============================================================================

/// A link template rendered on every serialized object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTemplate {
    pub rel: String,
    /// Path with `{field}` placeholders, e.g. `/authors/{author_id}`
    pub href: String,
}

/// Per-type settings
#[derive(Debug, Clone, Default)]
pub struct ModelMetadata {
    pub entity_type: String,
    /// Singular external name
    pub alias: Option<String>,
    /// Plural external name
    pub plural: Option<String>,
    /// Supertype whose declarations this type inherits
    pub extends: Option<String>,
    /// Attribute-key combinations identifying an existing record
    pub id_attributes: Vec<Vec<String>>,
    pub eager_load: Vec<String>,
    /// Column toggled instead of deleting the row
    pub soft_delete: Option<String>,
    pub links: Vec<LinkTemplate>,
    pub before_validate: Option<Hook>,
    pub before_save: Option<Hook>,
    pub before_create: Option<Hook>,
    pub after_save: Option<Hook>,
    pub after_create: Option<Hook>,
    pub after_initialize: Option<Hook>,
    pub validators: Vec<(Operation, Hook)>,
}

impl ModelMetadata {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            ..Default::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = Some(plural.into());
        self
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    pub fn id_attributes<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.id_attributes
            .push(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn eager_load<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.eager_load.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn soft_delete(mut self, column: impl Into<String>) -> Self {
        self.soft_delete = Some(column.into());
        self
    }

    pub fn link(mut self, rel: impl Into<String>, href: impl Into<String>) -> Self {
        self.links.push(LinkTemplate {
            rel: rel.into(),
            href: href.into(),
        });
        self
    }

    pub fn before_validate(mut self, hook: Hook) -> Self {
        self.before_validate = Some(hook);
        self
    }

    pub fn before_save(mut self, hook: Hook) -> Self {
        self.before_save = Some(hook);
        self
    }

    pub fn before_create(mut self, hook: Hook) -> Self {
        self.before_create = Some(hook);
        self
    }

    pub fn after_save(mut self, hook: Hook) -> Self {
        self.after_save = Some(hook);
        self
    }

    pub fn after_create(mut self, hook: Hook) -> Self {
        self.after_create = Some(hook);
        self
    }

    pub fn after_initialize(mut self, hook: Hook) -> Self {
        self.after_initialize = Some(hook);
        self
    }

    /// Hook run as `validate<operation>` during save or read validation
    pub fn validate_on(mut self, operation: Operation, hook: Hook) -> Self {
        self.validators.retain(|(op, _)| *op != operation);
        self.validators.push((operation, hook));
        self
    }

    pub fn validator(&self, operation: Operation) -> Option<&Hook> {
        self.validators
            .iter()
            .find(|(op, _)| *op == operation)
            .map(|(_, hook)| hook)
    }

    /// Overlay `over` onto `self`
    ///
    /// When inheriting from a supertype the external names are not carried
    /// over; use [`ModelMetadata::inherit`] for that case.
    pub fn merge(self, over: ModelMetadata) -> Self {
        let mut validators = self.validators;
        for (operation, hook) in over.validators {
            validators.retain(|(op, _)| *op != operation);
            validators.push((operation, hook));
        }
        let mut id_attributes = self.id_attributes;
        for combination in over.id_attributes {
            if !id_attributes.contains(&combination) {
                id_attributes.push(combination);
            }
        }
        Self {
            entity_type: self.entity_type,
            alias: over.alias.or(self.alias),
            plural: over.plural.or(self.plural),
            extends: over.extends.or(self.extends),
            id_attributes,
            eager_load: if over.eager_load.is_empty() {
                self.eager_load
            } else {
                over.eager_load
            },
            soft_delete: over.soft_delete.or(self.soft_delete),
            links: if over.links.is_empty() {
                self.links
            } else {
                over.links
            },
            before_validate: over.before_validate.or(self.before_validate),
            before_save: over.before_save.or(self.before_save),
            before_create: over.before_create.or(self.before_create),
            after_save: over.after_save.or(self.after_save),
            after_create: over.after_create.or(self.after_create),
            after_initialize: over.after_initialize.or(self.after_initialize),
            validators,
        }
    }

    /// A subtype's metadata layered over its supertype's
    pub fn inherit(parent: &ModelMetadata, child: ModelMetadata) -> Self {
        let base = ModelMetadata {
            entity_type: child.entity_type.clone(),
            alias: None,
            plural: None,
            ..parent.clone()
        };
        base.merge(child)
    }
}
