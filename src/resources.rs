use serde_json::Value;

use crate::{models::Record, policy::Access};

/// ResourceKind
///
/// The resource families mediated by this service. Each maps to a static
/// descriptor that drives validation, authorization, querying and file cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Donor,
    Advertisement,
    Event,
    UserProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    TextList,
}

/// What an optional field becomes on create when the client omits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Omit,
    Null,
    Zero,
    True,
}

impl Fallback {
    pub fn value(&self) -> Option<Value> {
        match self {
            Fallback::Omit => None,
            Fallback::Null => Some(Value::Null),
            Fallback::Zero => Some(Value::from(0)),
            Fallback::True => Some(Value::Bool(true)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    /// Accepted on create.
    pub create: bool,
    /// Accepted on partial update.
    pub update: bool,
    pub fallback: Fallback,
}

impl FieldSpec {
    const fn new(name: &'static str, ty: FieldType) -> Self {
        let fallback = match ty {
            FieldType::Number => Fallback::Null,
            _ => Fallback::Omit,
        };
        Self {
            name,
            ty,
            required: false,
            create: true,
            update: true,
            fallback,
        }
    }

    const fn text(name: &'static str) -> Self {
        Self::new(name, FieldType::Text)
    }

    const fn number(name: &'static str) -> Self {
        Self::new(name, FieldType::Number)
    }

    const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    const fn list(name: &'static str) -> Self {
        Self::new(name, FieldType::TextList)
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn create_only(mut self) -> Self {
        self.update = false;
        self
    }

    const fn update_only(mut self) -> Self {
        self.create = false;
        self
    }

    const fn or(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }
}

/// KindSpec
///
/// Static descriptor of one resource family. Every identifier used in a
/// provider query comes from here, never from the request.
#[derive(Debug)]
pub struct KindSpec {
    pub table: &'static str,
    /// Response key for one entity (`donor`).
    pub singular: &'static str,
    /// Response key for collections (`donors`).
    pub plural: &'static str,
    /// Human-readable name used in messages.
    pub label: &'static str,
    /// Column holding the owning principal's id.
    pub owner_field: Option<&'static str>,
    pub fields: &'static [FieldSpec],
    /// Exact-match query parameters.
    pub filters: &'static [&'static str],
    /// Substring query parameters: `(param, column)`.
    pub contains_filters: &'static [(&'static str, &'static str)],
    /// Columns covered by the free-text `search` parameter.
    pub searchable: &'static [&'static str],
    pub sortable: &'static [&'static str],
    pub default_sort: (&'static str, bool),
    /// Timestamp column for `date_from` / `date_to`.
    pub date_field: Option<&'static str>,
    /// Predicates always applied to public listings.
    pub fixed_filters: &'static [(&'static str, &'static str)],
    /// Columns holding public URLs of stored files.
    pub file_fields: &'static [&'static str],
    pub create_access: Access,
    pub mutate_access: Access,
}

static DONOR: KindSpec = KindSpec {
    table: "donors",
    singular: "donor",
    plural: "donors",
    label: "Donor",
    owner_field: Some("created_by"),
    fields: &[
        FieldSpec::text("full_name").required(),
        FieldSpec::text("cause").required(),
        FieldSpec::number("donation_amount").required(),
        FieldSpec::text("mobile").required(),
        FieldSpec::text("email").required(),
        FieldSpec::text("gender"),
        FieldSpec::text("image_url"),
    ],
    filters: &["cause", "gender"],
    contains_filters: &[],
    searchable: &["full_name", "cause", "email"],
    sortable: &["created_at", "updated_at", "donation_amount", "full_name"],
    default_sort: ("created_at", false),
    date_field: Some("created_at"),
    fixed_filters: &[],
    file_fields: &["image_url"],
    create_access: Access::Public,
    mutate_access: Access::Authenticated,
};

static ADVERTISEMENT: KindSpec = KindSpec {
    table: "advertisements",
    singular: "advertisement",
    plural: "advertisements",
    label: "Advertisement",
    owner_field: Some("created_by"),
    fields: &[
        FieldSpec::text("title").required(),
        FieldSpec::text("description").required(),
        FieldSpec::text("position").required(),
        FieldSpec::list("image_urls").required().create_only(),
        FieldSpec::text("image_url").update_only(),
        FieldSpec::text("redirect_url"),
        FieldSpec::number("priority").or(Fallback::Zero),
        FieldSpec::boolean("is_active").or(Fallback::True),
    ],
    filters: &["position"],
    contains_filters: &[],
    searchable: &["title", "description"],
    sortable: &["priority", "created_at", "updated_at", "title"],
    default_sort: ("priority", false),
    date_field: Some("created_at"),
    fixed_filters: &[("is_active", "true")],
    file_fields: &["image_url"],
    create_access: Access::Authenticated,
    mutate_access: Access::Authenticated,
};

static EVENT: KindSpec = KindSpec {
    table: "events",
    singular: "event",
    plural: "events",
    label: "Event",
    owner_field: Some("created_by"),
    fields: &[
        FieldSpec::text("short_title").required(),
        FieldSpec::text("priority").required(),
        FieldSpec::text("title").required(),
        FieldSpec::text("description").required(),
        FieldSpec::text("type").required(),
        FieldSpec::text("subtitle"),
        FieldSpec::text("writer_name"),
        FieldSpec::text("writer_designation"),
        FieldSpec::text("police_status"),
        FieldSpec::text("fir_status"),
        FieldSpec::text("location_name"),
        FieldSpec::number("latitude"),
        FieldSpec::number("longitude"),
        FieldSpec::text("photo_url"),
    ],
    filters: &["type", "priority", "police_status", "fir_status"],
    contains_filters: &[("location", "location_name"), ("writer", "writer_name")],
    searchable: &[
        "short_title",
        "title",
        "subtitle",
        "description",
        "location_name",
        "writer_name",
    ],
    sortable: &["created_at", "updated_at", "priority", "title", "short_title"],
    default_sort: ("created_at", false),
    date_field: Some("created_at"),
    fixed_filters: &[],
    file_fields: &["photo_url"],
    create_access: Access::AdminOnly,
    mutate_access: Access::Authenticated,
};

static USER_PROFILE: KindSpec = KindSpec {
    table: "user_auth",
    singular: "user",
    plural: "users",
    label: "User",
    owner_field: Some("id"),
    fields: &[FieldSpec::text("full_name"), FieldSpec::text("phone")],
    filters: &[],
    contains_filters: &[],
    searchable: &[],
    sortable: &["created_at"],
    default_sort: ("created_at", false),
    date_field: None,
    fixed_filters: &[],
    file_fields: &[],
    create_access: Access::Authenticated,
    mutate_access: Access::Authenticated,
};

impl ResourceKind {
    pub fn spec(&self) -> &'static KindSpec {
        match self {
            ResourceKind::Donor => &DONOR,
            ResourceKind::Advertisement => &ADVERTISEMENT,
            ResourceKind::Event => &EVENT,
            ResourceKind::UserProfile => &USER_PROFILE,
        }
    }

    /// Turns one validated create payload into the rows to insert.
    /// Advertisements produce one row per entry of `image_urls`.
    pub fn expand(&self, payload: Record) -> Vec<Record> {
        match self {
            ResourceKind::Advertisement => {
                let mut base = payload;
                let urls = match base.remove("image_urls") {
                    Some(Value::Array(urls)) => urls,
                    _ => Vec::new(),
                };
                urls.into_iter()
                    .map(|url| {
                        let mut row = base.clone();
                        row.insert("image_url".to_string(), url);
                        row
                    })
                    .collect()
            }
            _ => vec![payload],
        }
    }
}

impl KindSpec {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn sort_column(&self, name: &str) -> Option<&'static str> {
        self.sortable.iter().copied().find(|s| *s == name)
    }
}
