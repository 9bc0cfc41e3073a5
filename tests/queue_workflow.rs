use mergedex::{
    ContactId, ContactRecord, Mergedex, PersonName, QueueFilter, QueueOperation, QueueStatus,
};

fn contact(id: &str) -> ContactRecord {
    ContactRecord::new(id, PersonName::new("John", "Smith")).with_email("john@x.com")
}

fn enqueue_fix(mergedex: &mut Mergedex, subject: &str) -> mergedex::QueueItemId {
    let before = contact(subject);
    let after = before.clone().with_phone("555-123-4567");
    mergedex
        .enqueue_change(
            ContactId::from(subject),
            QueueOperation::Update,
            Some(after),
            Some(before),
            "phone-fixer",
        )
        .unwrap()
        .item_id()
}

#[test]
fn equivalent_changes_yield_one_active_item() {
    let mut mergedex = Mergedex::new();

    let first = enqueue_fix(&mut mergedex, "a");
    let second = enqueue_fix(&mut mergedex, "a");

    assert_eq!(first, second);
    assert_eq!(mergedex.pending_items().len(), 1);
}

#[test]
fn equivalent_change_for_other_subject_is_inserted() {
    let mut mergedex = Mergedex::new();

    enqueue_fix(&mut mergedex, "a");
    enqueue_fix(&mut mergedex, "b");

    assert_eq!(mergedex.pending_items().len(), 2);
}

#[test]
fn rejected_items_do_not_block_new_equivalent_changes() {
    let mut mergedex = Mergedex::new();

    let first = enqueue_fix(&mut mergedex, "a");
    mergedex.reject(&[first]).unwrap();

    // The rejected item is terminal; the same proposed change may be queued
    // again.
    let second = enqueue_fix(&mut mergedex, "a");
    assert_ne!(first, second);
    assert_eq!(mergedex.pending_items().len(), 1);
}

#[test]
fn bulk_approve_skips_ineligible_items() {
    let mut mergedex = Mergedex::new();

    let open = enqueue_fix(&mut mergedex, "a");
    let rejected = enqueue_fix(&mut mergedex, "b");
    mergedex.reject(&[rejected]).unwrap();

    let transitioned = mergedex.approve(&[open, rejected]).unwrap();
    assert_eq!(transitioned, 1);

    let approved = mergedex.queue_items(&QueueFilter::by_status(QueueStatus::Approved));
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].id, open);
    assert_eq!(approved[0].approved, Some(true));
}

#[test]
fn reject_records_the_review_decision() {
    let mut mergedex = Mergedex::new();

    let id = enqueue_fix(&mut mergedex, "a");
    mergedex.reject(&[id]).unwrap();

    let item = mergedex
        .queue_items(&QueueFilter::by_status(QueueStatus::Rejected))
        .remove(0);
    assert!(item.reviewed);
    assert_eq!(item.approved, Some(false));
}

#[test]
fn delete_removes_items_in_any_state() {
    let mut mergedex = Mergedex::new();

    let id = enqueue_fix(&mut mergedex, "a");
    mergedex.approve(&[id]).unwrap();

    assert!(mergedex.delete_item(id).unwrap());
    assert!(!mergedex.delete_item(id).unwrap());
    assert_eq!(mergedex.queue_items(&QueueFilter::default()).len(), 0);
}

#[test]
fn filters_compose_over_subject_and_origin() {
    let mut mergedex = Mergedex::new();

    enqueue_fix(&mut mergedex, "a");
    let before = contact("a");
    mergedex
        .enqueue_change(
            ContactId::from("a"),
            QueueOperation::Delete,
            None,
            Some(before),
            "dedupe",
        )
        .unwrap();

    let by_subject = mergedex.queue_items(&QueueFilter::by_subject(ContactId::from("a")));
    assert_eq!(by_subject.len(), 2);

    let mut by_origin = QueueFilter::default();
    by_origin.origin = Some("dedupe".to_string());
    let dedupe_items = mergedex.queue_items(&by_origin);
    assert_eq!(dedupe_items.len(), 1);
    assert_eq!(dedupe_items[0].operation, QueueOperation::Delete);
}

#[test]
fn enqueue_validates_operation_data_invariants() {
    let mut mergedex = Mergedex::new();

    let create_without_data = mergedex.enqueue_change(
        ContactId::from("a"),
        QueueOperation::Create,
        None,
        None,
        "import",
    );
    assert!(create_without_data.is_err());

    let update_without_before = mergedex.enqueue_change(
        ContactId::from("a"),
        QueueOperation::Update,
        Some(contact("a")),
        None,
        "import",
    );
    assert!(update_without_before.is_err());

    let delete_without_before = mergedex.enqueue_change(
        ContactId::from("a"),
        QueueOperation::Delete,
        None,
        None,
        "import",
    );
    assert!(delete_without_before.is_err());
}
