//! External naming: attribute aliases, case conventions and plural names

use convert_case::{Case, Casing};

/// Naming convention applied at the API boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Naming {
    /// Lower-camel-case external attribute names
    pub camel_case: bool,
}

impl Default for Naming {
    fn default() -> Self {
        Self { camel_case: true }
    }
}

impl Naming {
    pub fn new(camel_case: bool) -> Self {
        Self { camel_case }
    }

    /// The name a payload or response field is exposed as
    pub fn external(&self, name: &str) -> String {
        if self.camel_case {
            name.to_case(Case::Camel)
        } else {
            name.to_string()
        }
    }

    /// The name a filter or sort key is written as in a query string
    pub fn query(&self, name: &str) -> String {
        name.to_case(Case::Snake)
    }
}

/// (suffix, replacement, characters to drop) tried in order
const PLURAL_RULES: &[(&str, &str, usize)] = &[
    ("ss", "sses", 2),
    ("sh", "shes", 2),
    ("ch", "ches", 2),
    ("x", "xes", 1),
    ("z", "zes", 1),
    ("s", "ses", 1),
    ("fe", "ves", 2),
    ("lf", "lves", 2),
    ("ay", "ays", 2),
    ("ey", "eys", 2),
    ("oy", "oys", 2),
    ("uy", "uys", 2),
    ("y", "ies", 1),
];

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("datum", "data"),
];

/// Pluralize the last word of a snake_case or camelCase name
///
/// `order_item` becomes `order_items`; `shippingAddress` becomes
/// `shippingAddresses`.
pub fn pluralize(name: &str) -> String {
    let split = name
        .char_indices()
        .filter(|(_, c)| *c == '_' || c.is_uppercase())
        .map(|(i, c)| if c == '_' { i + 1 } else { i })
        .last()
        .unwrap_or(0);
    let (head, word) = name.split_at(split);
    if word.is_empty() {
        return name.to_string();
    }

    let lower = word.to_lowercase();
    if let Some((_, plural)) = IRREGULAR.iter().find(|(s, _)| *s == lower) {
        let plural = if word.starts_with(char::is_uppercase) {
            plural.to_case(Case::Pascal)
        } else {
            plural.to_string()
        };
        return format!("{}{}", head, plural);
    }
    for (suffix, replacement, drop) in PLURAL_RULES {
        if lower.ends_with(suffix) && word.len() > *drop {
            return format!("{}{}{}", head, &word[..word.len() - drop], replacement);
        }
    }
    format!("{}{}s", head, word)
}
