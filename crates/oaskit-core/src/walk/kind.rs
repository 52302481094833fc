//! Node kinds and the structural field table the walker dispatches on.

use std::str::FromStr;

use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::pointer::{decode_fragment_token, escape_token};

/// The OpenAPI object type of a visited node, recovered from its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[non_exhaustive]
pub enum NodeKind {
    /// The root OpenAPI object.
    Document,
    /// `info`.
    Info,
    /// An entry of a `servers` array.
    Server,
    /// An entry of the top-level `tags` array.
    Tag,
    /// An `externalDocs` object.
    ExternalDocs,
    /// `components`.
    Components,
    /// A path item (under `paths`, `webhooks`, callbacks, or components).
    PathItem,
    /// An operation under a path item.
    Operation,
    /// A parameter object.
    Parameter,
    /// A request body object.
    RequestBody,
    /// A media type object under `content`.
    MediaType,
    /// An encoding object.
    Encoding,
    /// A response object.
    Response,
    /// A header object.
    Header,
    /// An example object.
    Example,
    /// A link object.
    Link,
    /// A callback object (expression → path item).
    Callback,
    /// A security scheme object.
    SecurityScheme,
    /// One entry of a `security` array (scheme name → scopes).
    SecurityRequirement,
    /// A schema object (or boolean schema).
    Schema,
    /// An `x-*` specification extension value.
    Extension,
}

/// A named section under `components`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    AsRefStr,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "camelCase")]
pub enum ComponentKind {
    /// `components/schemas`.
    Schemas,
    /// `components/responses`.
    Responses,
    /// `components/parameters`.
    Parameters,
    /// `components/examples`.
    Examples,
    /// `components/requestBodies`.
    RequestBodies,
    /// `components/headers`.
    Headers,
    /// `components/securitySchemes`.
    SecuritySchemes,
    /// `components/links`.
    Links,
    /// `components/callbacks`.
    Callbacks,
    /// `components/pathItems`.
    PathItems,
}

/// How a field's value is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    /// A single node.
    One(NodeKind),
    /// An array of nodes.
    Seq(NodeKind),
    /// A single node, or an array of nodes (`items` in older drafts).
    OneOrSeq(NodeKind),
    /// A name → node map whose keys are plain names.
    Map(NodeKind),
    /// A patterned object whose `x-*` keys are extensions (`paths`, `responses`).
    Patterned(NodeKind),
}

const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

impl NodeKind {
    /// The components section this kind can be stored in, if referenceable.
    #[must_use]
    pub const fn component_kind(self) -> Option<ComponentKind> {
        match self {
            Self::Schema => Some(ComponentKind::Schemas),
            Self::Response => Some(ComponentKind::Responses),
            Self::Parameter => Some(ComponentKind::Parameters),
            Self::Example => Some(ComponentKind::Examples),
            Self::RequestBody => Some(ComponentKind::RequestBodies),
            Self::Header => Some(ComponentKind::Headers),
            Self::SecurityScheme => Some(ComponentKind::SecuritySchemes),
            Self::Link => Some(ComponentKind::Links),
            Self::Callback => Some(ComponentKind::Callbacks),
            Self::PathItem => Some(ComponentKind::PathItems),
            _ => None,
        }
    }

    /// Whether nodes of this kind may be a `$ref` instead of an inline object.
    #[must_use]
    pub const fn is_referenceable(self) -> bool {
        self.component_kind().is_some()
    }

    /// Whether `x-*` keys on this kind are specification extensions.
    #[must_use]
    pub const fn has_extensions(self) -> bool {
        !matches!(self, Self::SecurityRequirement | Self::Extension)
    }

    /// Fixed field names defined for this kind (extensions excluded).
    ///
    /// `Callback` has only patterned fields and returns an empty list.
    #[must_use]
    pub const fn known_fields(self) -> &'static [&'static str] {
        match self {
            Self::Document => &[
                "openapi", "info", "jsonSchemaDialect", "servers", "paths", "webhooks",
                "components", "security", "tags", "externalDocs",
            ],
            Self::Info => &[
                "title", "summary", "description", "termsOfService", "contact", "license",
                "version",
            ],
            Self::Server => &["url", "description", "variables"],
            Self::Tag => &["name", "description", "externalDocs"],
            Self::ExternalDocs => &["description", "url"],
            Self::Components => &[
                "schemas", "responses", "parameters", "examples", "requestBodies", "headers",
                "securitySchemes", "links", "callbacks", "pathItems",
            ],
            Self::PathItem => &[
                "$ref", "summary", "description", "get", "put", "post", "delete", "options",
                "head", "patch", "trace", "servers", "parameters",
            ],
            Self::Operation => &[
                "tags", "summary", "description", "externalDocs", "operationId", "parameters",
                "requestBody", "responses", "callbacks", "deprecated", "security", "servers",
            ],
            Self::Parameter => &[
                "$ref", "name", "in", "description", "required", "deprecated",
                "allowEmptyValue", "style", "explode", "allowReserved", "schema", "example",
                "examples", "content",
            ],
            Self::RequestBody => &["$ref", "description", "content", "required"],
            Self::MediaType => &["schema", "example", "examples", "encoding"],
            Self::Encoding => &["contentType", "headers", "style", "explode", "allowReserved"],
            Self::Response => &["$ref", "description", "headers", "content", "links"],
            Self::Header => &[
                "$ref", "description", "required", "deprecated", "allowEmptyValue", "style",
                "explode", "allowReserved", "schema", "example", "examples", "content",
            ],
            Self::Example => &["$ref", "summary", "description", "value", "externalValue"],
            Self::Link => &[
                "$ref", "operationRef", "operationId", "parameters", "requestBody",
                "description", "server",
            ],
            Self::SecurityScheme => &[
                "$ref", "type", "description", "name", "in", "scheme", "bearerFormat", "flows",
                "openIdConnectUrl",
            ],
            Self::Schema => SCHEMA_KEYWORDS,
            Self::Callback | Self::SecurityRequirement | Self::Extension => &[],
        }
    }

    /// Layout of the child under `key`, or `None` if it is not walked.
    pub(crate) fn field(self, key: &str) -> Option<Shape> {
        use NodeKind as K;
        use Shape::{Map, One, Patterned, Seq};

        let shape = match (self, key) {
            (K::Document, "info") => One(K::Info),
            (K::Document, "servers") | (K::PathItem | K::Operation, "servers") => Seq(K::Server),
            (K::Document, "paths") => Patterned(K::PathItem),
            (K::Document, "webhooks") => Map(K::PathItem),
            (K::Document, "components") => One(K::Components),
            (K::Document | K::Operation, "security") => Seq(K::SecurityRequirement),
            (K::Document, "tags") => Seq(K::Tag),
            (K::Document | K::Operation | K::Tag | K::Schema, "externalDocs") => {
                One(K::ExternalDocs)
            }

            (K::Components, section) => Map(ComponentKind::from_str(section).ok()?.node_kind()),

            (K::PathItem, method) if HTTP_METHODS.contains(&method) => One(K::Operation),
            (K::PathItem | K::Operation, "parameters") => Seq(K::Parameter),

            (K::Operation, "requestBody") => One(K::RequestBody),
            (K::Operation, "responses") => Patterned(K::Response),
            (K::Operation, "callbacks") => Map(K::Callback),

            (K::Parameter | K::Header | K::MediaType, "schema") => One(K::Schema),
            (K::Parameter | K::Header | K::RequestBody | K::Response, "content") => {
                Map(K::MediaType)
            }
            (K::Parameter | K::Header | K::MediaType, "examples") => Map(K::Example),
            (K::MediaType, "encoding") => Map(K::Encoding),
            (K::Encoding | K::Response, "headers") => Map(K::Header),
            (K::Response, "links") => Map(K::Link),
            (K::Link, "server") => One(K::Server),

            (K::Callback, "$ref") => return None,
            (K::Callback, _) => One(K::PathItem),

            (K::Schema, keyword) => schema_field(keyword)?,

            _ => return None,
        };
        Some(shape)
    }
}

fn schema_field(keyword: &str) -> Option<Shape> {
    use NodeKind::Schema;
    use Shape::{Map, One, OneOrSeq, Seq};

    let shape = match keyword {
        "properties" | "patternProperties" | "dependentSchemas" | "$defs" | "definitions" => {
            Map(Schema)
        }
        "allOf" | "oneOf" | "anyOf" | "prefixItems" => Seq(Schema),
        "items" => OneOrSeq(Schema),
        "additionalProperties" | "additionalItems" | "not" | "if" | "then" | "else"
        | "contains" | "propertyNames" | "unevaluatedItems" | "unevaluatedProperties"
        | "contentSchema" => One(Schema),
        _ => return None,
    };
    Some(shape)
}

/// JSON Schema 2020-12 plus OpenAPI schema keywords.
const SCHEMA_KEYWORDS: &[&str] = &[
    "$ref", "$id", "$schema", "$anchor", "$dynamicRef", "$dynamicAnchor", "$vocabulary",
    "$comment", "$defs", "definitions", "title", "description", "default", "deprecated",
    "readOnly", "writeOnly", "examples", "example", "type", "enum", "const", "multipleOf",
    "maximum", "exclusiveMaximum", "minimum", "exclusiveMinimum", "maxLength", "minLength",
    "pattern", "maxItems", "minItems", "uniqueItems", "maxContains", "minContains",
    "maxProperties", "minProperties", "required", "dependentRequired", "format",
    "contentEncoding", "contentMediaType", "contentSchema", "allOf", "anyOf", "oneOf", "not",
    "if", "then", "else", "dependentSchemas", "prefixItems", "items", "additionalItems",
    "contains", "properties", "patternProperties", "additionalProperties", "propertyNames",
    "unevaluatedItems", "unevaluatedProperties", "discriminator", "xml", "externalDocs",
    "nullable",
];

impl ComponentKind {
    /// The node kind stored in this section.
    #[must_use]
    pub const fn node_kind(self) -> NodeKind {
        match self {
            Self::Schemas => NodeKind::Schema,
            Self::Responses => NodeKind::Response,
            Self::Parameters => NodeKind::Parameter,
            Self::Examples => NodeKind::Example,
            Self::RequestBodies => NodeKind::RequestBody,
            Self::Headers => NodeKind::Header,
            Self::SecuritySchemes => NodeKind::SecurityScheme,
            Self::Links => NodeKind::Link,
            Self::Callbacks => NodeKind::Callback,
            Self::PathItems => NodeKind::PathItem,
        }
    }

    /// Local reference to a component of this kind (`#/components/schemas/Pet`).
    #[must_use]
    pub fn local_ref(self, name: &str) -> String {
        format!("#/components/{self}/{}", escape_token(name))
    }
}

/// Split a local component reference into its section and component name.
///
/// `#/components/schemas/Pet/properties/id` → `(Schemas, "Pet")`. Anything
/// that does not point into a known components section yields `None`.
#[must_use]
pub fn parse_component_ref(reference: &str) -> Option<(ComponentKind, String)> {
    let rest = reference.strip_prefix("#/components/")?;
    let mut tokens = rest.split('/');
    let kind = ComponentKind::from_str(tokens.next()?).ok()?;
    let name = decode_fragment_token(tokens.next()?);
    (!name.is_empty()).then_some((kind, name))
}
