// SPDX-License-Identifier: MIT OR Apache-2.0

//! `#[log_context]` and `#[log_parameters]` end to end, over the thread-local store.

use std::any::Any;
use std::sync::{Arc, Once};

use logscope::provider::{StoreProvider, register_provider};
use logscope::store::ThreadLocalStore;
use logscope::{ContextExtractor, MappedEntries, log_context, log_parameters};

fn install() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // every integration test binary has its own registry
        register_provider(Arc::new(StoreProvider::thread_local())).unwrap();
    });
}

struct OrdersService;

#[log_context]
impl OrdersService {
    #[log_context("refund")]
    fn issue_refund(&self, #[log_context("order")] order_id: u64, reason: &str) -> (String, Option<String>) {
        assert!(!reason.is_empty());
        (ThreadLocalStore::breadcrumb(), ThreadLocalStore::value("order"))
    }

    fn nested(&self) -> Vec<String> {
        ThreadLocalStore::nested()
    }

    fn decline(&self, #[log_context] code: u32) -> Result<(), String> {
        check(code)?;
        Ok(())
    }

    fn explode(&self) {
        panic!("boom")
    }

    async fn untouched(&self) -> usize {
        ThreadLocalStore::depth()
    }
}

fn check(code: u32) -> Result<(), String> {
    Err(format!("declined with code {code}"))
}

struct Billing;

#[log_context("billing")]
impl Billing {
    fn charge(&self, orders: &OrdersService) -> Vec<String> {
        orders.nested()
    }
}

#[log_context]
fn nightly_job() -> Vec<String> {
    ThreadLocalStore::nested()
}

#[log_context("batch", "import")]
fn import_batch(#[log_context("batch.size")] size: usize) -> (Vec<String>, MappedEntries) {
    assert!(size > 0);
    (ThreadLocalStore::nested(), ThreadLocalStore::mapped())
}

struct Inventory;

impl Inventory {
    #[log_context]
    fn reserve(&self, note: &str, #[log_context("sku")] sku: &str, retries: u8) -> (Vec<String>, MappedEntries) {
        assert!(!note.is_empty() && retries < 10);
        (ThreadLocalStore::nested(), ThreadLocalStore::mapped())
    }

    #[log_parameters]
    fn release(&self, #[log_context("sku")] sku: &str, note: &str) -> (usize, Option<String>) {
        assert!(!note.is_empty());
        (ThreadLocalStore::depth(), ThreadLocalStore::value("sku"))
    }
}

#[log_parameters]
fn audit(#[log_context] account: u64) -> (usize, MappedEntries) {
    (ThreadLocalStore::depth(), ThreadLocalStore::mapped())
}

struct Person {
    name: String,
    dob: String,
}

#[derive(Default)]
struct PersonExtractor;

impl ContextExtractor for PersonExtractor {
    fn extract(&self, value: Option<&dyn Any>) -> MappedEntries {
        let Some(person) = value.and_then(|v| v.downcast_ref::<Person>()) else {
            return MappedEntries::new();
        };
        [("name", person.name.as_str()), ("dob", person.dob.as_str())]
            .into_iter()
            .collect()
    }
}

#[log_context]
fn onboard(
    #[extracted_context(extractor = PersonExtractor, prefix = "employee.")] person: &Person,
    #[log_context] team: &str,
) -> MappedEntries {
    assert!(!person.name.is_empty() && !team.is_empty());
    ThreadLocalStore::mapped()
}

#[log_context]
fn hire(#[extracted_context(extractor = PersonExtractor)] person: Person) -> MappedEntries {
    let mapped = ThreadLocalStore::mapped();
    drop(person);
    mapped
}

fn john() -> Person {
    Person {
        name: "John".to_string(),
        dob: "20010821".to_string(),
    }
}

#[test]
fn type_then_method_then_parameter() {
    install();
    let (breadcrumb, order) = OrdersService.issue_refund(42, "damaged");
    assert_eq!(breadcrumb, "OrdersService refund");
    assert_eq!(order.as_deref(), Some("42"));

    assert_eq!(ThreadLocalStore::depth(), 0);
    assert!(ThreadLocalStore::mapped().is_empty());
}

#[test]
fn undeclared_method_gets_type_labels_only() {
    install();
    assert_eq!(OrdersService.nested(), ["OrdersService"]);
}

#[test]
fn calls_nest() {
    install();
    assert_eq!(Billing.charge(&OrdersService), ["billing", "OrdersService"]);
    assert_eq!(ThreadLocalStore::depth(), 0);
}

#[test]
fn free_functions() {
    install();
    assert_eq!(nightly_job(), ["nightly_job"]);

    let (nested, mapped) = import_batch(3);
    assert_eq!(nested, ["batch", "import"]);
    assert_eq!(mapped.get("batch.size"), Some("3"));
    assert_eq!(ThreadLocalStore::depth(), 0);
}

#[test]
fn extracted_parameters() {
    install();
    let mapped = onboard(&john(), "payroll");
    let entries: Vec<_> = mapped.iter().collect();
    assert_eq!(
        entries,
        [
            ("employee.name", "John"),
            ("employee.dob", "20010821"),
            ("team", "payroll"),
        ]
    );

    let mapped = hire(john());
    assert_eq!(mapped.keys().collect::<Vec<_>>(), ["name", "dob"]);
    assert!(ThreadLocalStore::mapped().is_empty());
}

#[test]
fn early_return_reverses() {
    install();
    assert_eq!(
        OrdersService.decline(7),
        Err("declined with code 7".to_string())
    );
    assert_eq!(ThreadLocalStore::depth(), 0);
    assert_eq!(ThreadLocalStore::value("code"), None);
}

#[test]
fn panic_reverses() {
    install();
    let outcome = std::panic::catch_unwind(|| OrdersService.explode());
    assert!(outcome.is_err());
    assert_eq!(ThreadLocalStore::depth(), 0);
}

#[test_executors::async_test]
async fn async_methods_are_left_alone() {
    install();
    assert_eq!(OrdersService.untouched().await, 0);
}

#[test]
fn unbound_parameters_beside_an_annotated_one() {
    install();
    let (nested, mapped) = Inventory.reserve("restock", "A-100", 2);
    assert_eq!(nested, ["reserve"]);
    assert_eq!(mapped.iter().collect::<Vec<_>>(), [("sku", "A-100")]);
    assert_eq!(ThreadLocalStore::depth(), 0);
    assert!(ThreadLocalStore::mapped().is_empty());
}

#[test]
fn parameters_only_pushes_no_labels() {
    install();
    let (depth, sku) = Inventory.release("A-100", "cancelled");
    assert_eq!(depth, 0);
    assert_eq!(sku.as_deref(), Some("A-100"));
    assert_eq!(ThreadLocalStore::value("sku"), None);

    let (depth, mapped) = audit(1234);
    assert_eq!(depth, 0);
    assert_eq!(mapped.iter().collect::<Vec<_>>(), [("account", "1234")]);
    assert!(ThreadLocalStore::mapped().is_empty());
}
