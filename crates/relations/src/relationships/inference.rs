//! Relationship naming conventions
//!
//! Keys and tables that a declaration leaves unspecified are derived from
//! model type names:
//!
//! - table: plural snake case (`BlogPost` -> `blog_posts`)
//! - HasOne / HasMany foreign key: `<owner>_id` on the related table
//! - BelongsTo foreign key: `<related>_id` on the owner
//! - ManyToMany pivot table: both singular snake names, sorted, joined with
//!   `_` (`User` + `Role` -> `role_user`), keyed by `<owner>_id` and
//!   `<related>_id`
//!
//! Inflection covers regular plurals, `-y` to `-ies` and sibilant `-es`.

/// Convert a model type name to snake case
pub fn snake_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) && !result.ends_with('_') {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}

/// Simple pluralization (English-centric)
pub fn pluralize(name: &str) -> String {
    let ends_with_consonant_y = name.ends_with('y')
        && !["ay", "ey", "iy", "oy", "uy"].iter().any(|suffix| name.ends_with(suffix));

    if ends_with_consonant_y {
        format!("{}ies", &name[..name.len() - 1])
    } else if ["s", "sh", "ch", "x", "z"].iter().any(|suffix| name.ends_with(suffix)) {
        format!("{}es", name)
    } else {
        format!("{}s", name)
    }
}

/// Simple singularization (English-centric)
pub fn singularize(name: &str) -> String {
    if name.ends_with("ies") && name.len() > 3 {
        format!("{}y", &name[..name.len() - 3])
    } else if ["sses", "ches", "shes", "xes", "zes"].iter().any(|suffix| name.ends_with(suffix)) {
        name[..name.len() - 2].to_string()
    } else if ["ss", "us", "is"].iter().any(|suffix| name.ends_with(suffix)) {
        name.to_string()
    } else if name.ends_with('s') && name.len() > 1 {
        name[..name.len() - 1].to_string()
    } else {
        name.to_string()
    }
}

/// Table name for a model type
pub fn table_name(model: &str) -> String {
    pluralize(&snake_case(model))
}

/// Foreign key column referencing a model (`User` -> `user_id`)
pub fn foreign_key(model: &str) -> String {
    format!("{}_id", singularize(&snake_case(model)))
}

/// Pivot table joining two models, independent of declaration side
pub fn pivot_table(first_model: &str, second_model: &str) -> String {
    let mut parts = [
        singularize(&snake_case(first_model)),
        singularize(&snake_case(second_model)),
    ];
    parts.sort();
    parts.join("_")
}
