use serde::{Deserialize, Serialize};

/// One page of an offset-paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub total_pages: usize,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    /// Slice `all` to the 1-indexed `page` of size `limit`.
    pub fn paginate(all: Vec<T>, page: u32, limit: u32) -> Self {
        let page = page.max(1);
        let limit = limit.max(1);
        let total_count = all.len();
        let total_pages = total_count.div_ceil(limit as usize);
        let offset = (page as usize - 1).saturating_mul(limit as usize);

        let items = all
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect();

        Self {
            items,
            total_count,
            total_pages,
            page,
            limit,
        }
    }
}
