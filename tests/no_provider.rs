// SPDX-License-Identifier: MIT OR Apache-2.0

//! Without a registered provider everything degrades to no-ops.

use logscope::log_context;
use logscope::provider::{builder, lookup_provider};
use logscope::store::ThreadLocalStore;

struct Reports;

#[log_context]
impl Reports {
    #[log_context("render")]
    fn render(&self, #[log_context] page: u32) -> (usize, Option<String>) {
        assert!(page > 0);
        (ThreadLocalStore::depth(), ThreadLocalStore::value("page"))
    }
}

#[test]
fn everything_is_a_no_op() {
    assert_eq!(lookup_provider().name(), "no-op");

    for _ in 0..3 {
        let mut pending = builder();
        pending
            .add_nested(["a", "b"])
            .add_mapped("k", "v")
            .add_mapped_all([("x", "1")]);
        assert!(pending.is_no_op());
        let unit = pending.build();
        assert!(unit.is_empty());
        assert_eq!(unit.reverse(), Ok(()));
    }

    assert_eq!(Reports.render(2), (0, None));
    assert_eq!(ThreadLocalStore::depth(), 0);
}
