//! Category search API.
//!
//! Turns an arbitrary selection of category records into a list that is consistent for an
//! observer who only sees viewable categories. Two exclusion tags are kept apart:
//!
//! * hidden: the category itself is dropped, its descendants are promoted (their `parent`,
//!   `path` and `depth` are rewritten around it);
//! * context: the category failed access-context validation; it is dropped together with
//!   every descendant.

use std::collections::{HashMap, HashSet};

use crate::{
    auth::Capabilities,
    error::CategoryError,
    models::{Category, CategoryInfo, CriteriaEntry, GetCategoriesRequest, TOP_CATEGORY_ID, join_path},
    repository::{CategoryFilter, RepositoryState},
    visibility::{ContextAccess, RequestContext},
};

/// Why a category was left out of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// Its own access context could not be validated.
    Context,
    /// An ancestor was excluded.
    Parent,
}

/// Reduces a theme name to a valid plugin-style identifier, or to an empty string.
pub fn clean_theme(raw: &str) -> String {
    let theme = raw.trim();
    let valid = theme.starts_with(|c: char| c.is_ascii_lowercase())
        && theme
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !theme.contains("__")
        && !theme.ends_with('_');
    if valid { theme.to_string() } else { String::new() }
}

/// Cleans an integer parameter: the leading optionally signed digits, or 0 when there are
/// none. Id 0 never names a stored category, so an unusable `id` simply matches nothing.
pub fn clean_int(value: &str) -> i64 {
    let value = value.trim_start();
    let unsigned = value.strip_prefix(['-', '+']).unwrap_or(value);
    let digits = unsigned.len() - unsigned.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let end = value.len() - unsigned.len() + digits;
    value[..end].parse().unwrap_or(0)
}

/// Cleans an id sequence: everything but digits and commas is dropped, empty items are
/// skipped. An empty sequence matches nothing.
pub fn clean_sequence(value: &str) -> Vec<i64> {
    value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',')
        .collect::<String>()
        .split(',')
        .filter_map(|part| part.parse().ok())
        .collect()
}

fn require(allowed: bool, key: &str) -> Result<(), CategoryError> {
    if allowed {
        Ok(())
    } else {
        tracing::warn!(key, "forbidden category search criteria");
        Err(CategoryError::Forbidden {
            key: key.to_string(),
        })
    }
}

/// parse_criteria
///
/// Validates the `{key, value}` criteria and folds them into a `CategoryFilter`.
/// Keys are trimmed; a key seen before is skipped, except `ids` whose lists all apply.
/// Unknown keys fail with `InvalidCriteria`, privileged keys without the capability fail
/// with `Forbidden`.
pub fn parse_criteria(
    criteria: &[CriteriaEntry],
    capabilities: Capabilities,
) -> Result<CategoryFilter, CategoryError> {
    let mut filter = CategoryFilter::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for criterion in criteria {
        let key = criterion.key.trim();
        let value = criterion.value.as_str();
        if key != "ids" && !seen.insert(key) {
            continue;
        }

        match key {
            "id" => filter.id = Some(clean_int(value)),
            "ids" => filter.ids.push(clean_sequence(value)),
            "name" => filter.name = Some(value.trim().to_string()),
            "parent" => filter.parent = Some(clean_int(value)),
            "idnumber" => {
                require(capabilities.manage, key)?;
                filter.idnumber = Some(value.to_string());
            }
            "visible" => {
                require(capabilities.manage || capabilities.view_hidden, key)?;
                filter.visible = Some(clean_int(value) != 0);
            }
            "theme" => {
                require(capabilities.manage, key)?;
                filter.theme = Some(clean_theme(value));
            }
            other => {
                return Err(CategoryError::InvalidCriteria {
                    key: other.to_string(),
                });
            }
        }
    }
    Ok(filter)
}

/// The category id the caller asked for specifically and exclusively, if any: the request
/// consists of a single `id` criterion.
fn exclusive_request(request: &GetCategoriesRequest) -> Option<i64> {
    match request.criteria.as_slice() {
        [only] if only.key.trim() == "id" => Some(clean_int(&only.value)),
        _ => None,
    }
}

/// Loads the raw selection: everything without criteria, otherwise the matches plus, when
/// requested, all their descendants (constrained by the `visible`/`theme` criteria).
async fn select_records(
    store: &RepositoryState,
    filter: &CategoryFilter,
    request: &GetCategoriesRequest,
) -> Result<Vec<Category>, CategoryError> {
    if request.criteria.is_empty() {
        return Ok(store.all_records().await?);
    }

    let matched = store.records_by_filter(filter).await?;
    if matched.is_empty() || !request.addsubcategories {
        return Ok(matched);
    }

    let subtree = filter.subtree();
    let mut seen: HashSet<i64> = matched.iter().map(|c| c.id).collect();
    let mut selection = matched.clone();
    for category in &matched {
        for descendant in store.records_under_path(&category.path, &subtree).await? {
            if seen.insert(descendant.id) {
                selection.push(descendant);
            }
        }
    }
    Ok(selection)
}

fn to_info(category: Category, capabilities: Capabilities) -> CategoryInfo {
    let mut info = CategoryInfo {
        id: category.id,
        name: category.name,
        description: category.description.unwrap_or_default(),
        descriptionformat: category.descriptionformat,
        parent: category.parent,
        sortorder: category.sortorder,
        coursecount: category.coursecount,
        depth: category.depth,
        path: category.path,
        idnumber: None,
        visible: None,
        visibleold: None,
        timemodified: None,
        theme: None,
    };
    if capabilities.manage {
        info.idnumber = category.idnumber;
        info.visible = Some(i32::from(category.visible));
        info.visibleold = Some(i32::from(category.visibleold));
        info.timemodified = Some(category.timemodified.timestamp());
        info.theme = Some(clean_theme(category.theme.as_deref().unwrap_or("")));
    }
    info
}

/// get_categories
///
/// Runs the category search for the request's principal. Records are processed in path
/// order so every ancestor is resolved before its descendants. Output is ordered by
/// `sortorder`, ties by rewritten path.
pub async fn get_categories(
    context: &RequestContext,
    store: &RepositoryState,
    request: &GetCategoriesRequest,
) -> Result<Vec<CategoryInfo>, CategoryError> {
    let capabilities = context.principal().capabilities();
    let filter = parse_criteria(&request.criteria, capabilities)?;
    let exclusive_id = exclusive_request(request);

    let mut categories = select_records(store, &filter, request).await?;
    categories.sort_by(|a, b| a.path.cmp(&b.path));

    let visibility = context.visibility().await?;
    let mut excluded: HashMap<i64, Exclusion> = HashMap::new();
    let mut validated: HashSet<i64> = HashSet::new();
    let mut infos = Vec::with_capacity(categories.len());

    for mut category in categories {
        if visibility.is_hidden(category.id) {
            continue;
        }

        let original_chain = category.ancestor_ids();
        let surviving: Vec<i64> = original_chain
            .iter()
            .copied()
            .filter(|id| !visibility.is_hidden(*id))
            .collect();

        // Promote past hidden parents: nearest surviving ancestor above the old parent.
        if visibility.is_hidden(category.parent) {
            let above = original_chain
                .iter()
                .position(|id| *id == category.parent)
                .map_or(&original_chain[..], |index| &original_chain[..index]);
            category.parent = above
                .iter()
                .rev()
                .copied()
                .find(|id| !visibility.is_hidden(*id))
                .unwrap_or(TOP_CATEGORY_ID);
        }

        let mut chain = surviving.clone();
        chain.push(category.id);
        category.path = join_path(&chain);
        category.depth = chain.len() as i32;

        // Context exclusion is inherited, hiding is not: hidden ancestors are not in
        // `surviving` and never land in `excluded`.
        for ancestor in &surviving {
            if validated.insert(*ancestor) {
                if let ContextAccess::Denied(cause) = context.validate_context(*ancestor).await? {
                    tracing::warn!(category = ancestor, %cause, "ancestor context not valid");
                    excluded.insert(*ancestor, Exclusion::Context);
                }
            }
            if excluded.contains_key(ancestor) {
                excluded.insert(category.id, Exclusion::Parent);
            }
        }

        validated.insert(category.id);
        if let ContextAccess::Denied(cause) = context.validate_context(category.id).await? {
            tracing::warn!(category = category.id, %cause, "category context not valid");
            excluded.insert(category.id, Exclusion::Context);
            if exclusive_id == Some(category.id) {
                return Err(CategoryError::ContextInvalid {
                    id: category.id,
                    cause,
                });
            }
        }

        if !excluded.contains_key(&category.id) {
            infos.push(to_info(category, capabilities));
        }
    }

    infos.sort_by(|a, b| a.path.cmp(&b.path));
    debug_assert!(infos.iter().all(|info| {
        let ids = crate::models::parse_path(&info.path);
        ids.len() as i32 == info.depth && ids.last() == Some(&info.id)
    }));
    infos.sort_by_key(|info| info.sortorder);

    tracing::debug!(
        user = %context.principal().id,
        returned = infos.len(),
        excluded = excluded.len(),
        "category search served"
    );
    Ok(infos)
}
