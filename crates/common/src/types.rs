//! 通用类型定义

use serde::{Deserialize, Serialize};

/// 分页参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 100,
        }
    }
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    pub fn offset(&self) -> u32 {
        (self.page.saturating_sub(1)) * self.page_size
    }

    /// 下一页
    pub fn next(&self) -> Self {
        Self {
            page: self.page + 1,
            page_size: self.page_size,
        }
    }
}

/// 分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: &Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
        }
    }

    /// 从完整列表中切出一页
    pub fn from_slice(all: &[T], pagination: &Pagination) -> Self
    where
        T: Clone,
    {
        let items = all
            .iter()
            .skip(pagination.offset() as usize)
            .take(pagination.page_size as usize)
            .cloned()
            .collect();
        Self::new(items, all.len() as u64, pagination)
    }

    pub fn total_pages(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        ((self.total as f64) / (self.page_size as f64)).ceil() as u32
    }

    /// 是否还有下一页
    pub fn has_more(&self) -> bool {
        self.page < self.total_pages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_through_slice() {
        let all: Vec<u32> = (0..5).collect();
        let first = PagedResult::from_slice(&all, &Pagination::new(1, 2));
        assert_eq!(first.items, vec![0, 1]);
        assert!(first.has_more());

        let last = PagedResult::from_slice(&all, &Pagination::new(3, 2));
        assert_eq!(last.items, vec![4]);
        assert!(!last.has_more());
    }
}
