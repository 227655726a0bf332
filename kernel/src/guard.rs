//! 失败回滚保护

/// 在作用域退出时执行回滚闭包，除非已经调用了 [`FailureGuard::disarm`]
#[must_use = "an unbound guard runs its rollback immediately"]
pub struct FailureGuard<F: FnOnce()> {
    rollback: Option<F>,
}

impl<F: FnOnce()> FailureGuard<F> {
    /// 设置回滚闭包
    pub fn new(rollback: F) -> Self {
        Self {
            rollback: Some(rollback),
        }
    }

    /// 解除保护，回滚不再执行
    pub fn disarm(mut self) {
        self.rollback = None;
    }

    /// 回滚是否仍会执行
    pub fn is_armed(&self) -> bool {
        self.rollback.is_some()
    }
}

impl<F: FnOnce()> Drop for FailureGuard<F> {
    fn drop(&mut self) {
        if let Some(rollback) = self.rollback.take() {
            rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn test_rollback_runs_on_early_exit() {
        let rolled_back = Cell::new(false);
        let run = |fail: bool| -> Result<(), ()> {
            let guard = FailureGuard::new(|| rolled_back.set(true));
            assert!(guard.is_armed());
            if fail {
                return Err(());
            }
            guard.disarm();
            Ok(())
        };

        assert!(run(false).is_ok());
        assert!(!rolled_back.get());
        assert!(run(true).is_err());
        assert!(rolled_back.get());
    }
}
