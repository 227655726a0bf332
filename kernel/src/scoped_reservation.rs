//! 作用域资源预留
//!
//! 两阶段预留：构造时尝试预留，[`ScopedResourceReservation::commit`]
//! 使预留永久生效；未提交就被丢弃的预留会把值还给限额。

use crate::resource_limit::{LimitableResource, ResourceLimit};

/// 作用域资源预留
///
/// 只能移动，不能复制。没有限额或预留值为 0 时视为成功，且不触碰限额。
#[must_use = "dropping the reservation releases it immediately"]
#[derive(Debug)]
pub struct ScopedResourceReservation<'a> {
    limit: Option<&'a ResourceLimit>,
    resource: LimitableResource,
    value: u64,
    succeeded: bool,
}

impl<'a> ScopedResourceReservation<'a> {
    /// 在 `limit` 上为 `resource` 预留 `value`
    pub fn new(limit: Option<&'a ResourceLimit>, resource: LimitableResource, value: u64) -> Self {
        let succeeded = match limit {
            Some(limit) if value != 0 => limit.reserve(resource, value),
            _ => true,
        };
        Self {
            limit,
            resource,
            value,
            succeeded,
        }
    }

    /// 预留是否成功
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// 提交预留，之后丢弃不再释放
    pub fn commit(mut self) {
        self.limit = None;
    }
}

impl Drop for ScopedResourceReservation<'_> {
    fn drop(&mut self) {
        if let Some(limit) = self.limit {
            if self.value != 0 && self.succeeded {
                limit.release(self.resource, self.value);
            }
        }
    }
}
