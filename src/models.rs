use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// --- Core Records (Mapped to Database) ---

/// User
///
/// Minimal identity record stored in the `profiles` table, resolved during authentication.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    // 'admin', 'manager', 'auditor' or any other role without category capabilities.
    pub role: String,
}

/// Category
///
/// A row of the `course_categories` table. `path` is the slash-separated chain of ancestor ids
/// ending in the category's own id (`/1/4/9`) and `depth` is the number of segments in it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Category {
    pub id: i64,
    // 0 for top-level categories.
    pub parent: i64,
    pub path: String,
    pub depth: i32,
    // Unique across siblings; defines the natural sibling order.
    pub sortorder: i32,
    pub name: String,
    pub idnumber: Option<String>,
    pub description: Option<String>,
    pub descriptionformat: i32,
    pub coursecount: i32,
    pub visible: bool,
    pub visibleold: bool,
    #[ts(type = "string")]
    pub timemodified: DateTime<Utc>,
    pub theme: Option<String>,
}

/// Id of the synthetic root standing for the whole system.
pub const TOP_CATEGORY_ID: i64 = 0;

impl Category {
    /// The pseudo-category representing the whole system. It has no store record.
    pub fn top() -> Self {
        Category {
            id: TOP_CATEGORY_ID,
            parent: TOP_CATEGORY_ID,
            path: String::new(),
            depth: 0,
            name: "Top".to_string(),
            visible: true,
            visibleold: true,
            ..Category::default()
        }
    }

    pub fn is_top(&self) -> bool {
        self.id == TOP_CATEGORY_ID
    }

    /// Every id in `path`, root first, own id last.
    pub fn path_ids(&self) -> Vec<i64> {
        parse_path(&self.path)
    }

    /// Ancestor ids from `path`, root first, own id excluded.
    pub fn ancestor_ids(&self) -> Vec<i64> {
        let mut ids = self.path_ids();
        if ids.last() == Some(&self.id) {
            ids.pop();
        }
        ids
    }
}

/// Splits a materialized path into its ids, ignoring empty or non-numeric segments.
pub fn parse_path(path: &str) -> Vec<i64> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| segment.parse().ok())
        .collect()
}

/// Joins ids back into a materialized path (`/1/3`).
pub fn join_path(ids: &[i64]) -> String {
    ids.iter().map(|id| format!("/{}", id)).collect()
}

// --- External API Schemas ---

/// CriteriaEntry
///
/// One `{key, value}` filter of the category search API.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CriteriaEntry {
    #[schema(example = "parent")]
    pub key: String,
    #[schema(example = "4")]
    pub value: String,
}

fn default_addsubcategories() -> bool {
    true
}

/// GetCategoriesRequest
///
/// Input payload of the category search API (POST /webservice/categories).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GetCategoriesRequest {
    #[serde(default)]
    pub criteria: Vec<CriteriaEntry>,
    /// Also return every sub category (all levels) of the matched categories.
    #[serde(default = "default_addsubcategories")]
    pub addsubcategories: bool,
}

impl Default for GetCategoriesRequest {
    fn default() -> Self {
        Self {
            criteria: vec![],
            addsubcategories: true,
        }
    }
}

/// CategoryInfo
///
/// Category record as delivered by the search API. `parent`, `path` and `depth` are rewritten
/// so hidden ancestors never show up. The optional fields are only present for callers
/// holding the manage capability.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct CategoryInfo {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub descriptionformat: i32,
    pub parent: i64,
    pub sortorder: i32,
    pub coursecount: i32,
    pub depth: i32,
    pub path: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub idnumber: Option<String>,
    // 1: available, 0: not available.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub visible: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub visibleold: Option<i32>,
    // Unix timestamp.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timemodified: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub theme: Option<String>,
}

// --- Tree / Listing Query Parameters ---

/// ChildrenQuery
///
/// Query parameters of GET /categories/{id}/children.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ChildrenQuery {
    /// Comma-separated sort fields, `-` prefix for descending (e.g. `name,-id`).
    pub sort: Option<String>,
    pub offset: Option<usize>,
    /// Maximum number of children; 0 or absent means no limit.
    pub limit: Option<usize>,
}

/// BrowseQuery
///
/// Query parameters of GET /categories/browse.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct BrowseQuery {
    /// Category to browse; the user's top category when absent.
    pub categoryid: Option<i64>,
    pub sort: Option<String>,
    pub page: Option<usize>,
    pub perpage: Option<usize>,
}

/// TreeQuery
///
/// Query parameters of GET /categories/{id}/tree.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct TreeQuery {
    pub depth: Option<usize>,
    pub limit: Option<usize>,
}

/// ListingQuery
///
/// Query parameters of GET /admin/categories/listing.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ListingQuery {
    /// Currently selected category.
    pub selected: Option<i64>,
    /// Comma-separated ids of expanded categories.
    pub expanded: Option<String>,
}

// --- Tree / Listing Responses ---

/// CategoryChildren
///
/// A page of effectively visible children.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CategoryChildren {
    pub parent: i64,
    pub children: Vec<Category>,
}

/// ChildrenCount
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ChildrenCount {
    pub id: i64,
    pub children_count: usize,
}

/// CategoryPage
///
/// Browse page of a category: the category itself, one page of its children and the total
/// number of children across all pages.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CategoryPage {
    pub category: Category,
    pub children: Vec<Category>,
    pub children_count: usize,
    pub page: usize,
    pub per_page: usize,
}

/// CategoryTreeNode
///
/// Node of the rendered category tree. `has_more` is set when the children were cut by the
/// per-level limit.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CategoryTreeNode {
    pub category: Category,
    pub children_count: usize,
    pub has_more: bool,
    #[schema(no_recursion)]
    pub children: Vec<CategoryTreeNode>,
}

/// ListingItem
///
/// One top-level row of the management listing.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ListingItem {
    pub category: Category,
    pub children_count: usize,
    // Filled only for expanded rows.
    pub subcategories: Vec<Category>,
}

/// CategoryListing
///
/// Management listing: top-level categories plus the selection state, with every hidden
/// ancestor removed from the selected chain.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CategoryListing {
    pub items: Vec<ListingItem>,
    pub selected_category: Option<i64>,
    pub selected_parents: Vec<i64>,
}
