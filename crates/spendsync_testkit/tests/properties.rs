//! Property tests for the offline write buffer.

use proptest::prelude::*;
use spendsync_testkit::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn offline_queue_tracks_pending_records(payloads in payloads_strategy(12)) {
        let client = TestClient::memory();
        for payload in &payloads {
            client.record_expense(payload.clone()).unwrap();
        }

        prop_assert_eq!(client.queue_len(), payloads.len());
        prop_assert_eq!(client.pending_count(), payloads.len());
    }

    #[test]
    fn restart_loses_nothing(payloads in payloads_strategy(8)) {
        let client = TestClient::memory();
        for payload in &payloads {
            client.record_expense(payload.clone()).unwrap();
        }
        let before_records = client.expenses();
        let before_queue = client.pending_snapshot();

        let client = client.reopen();

        prop_assert_eq!(client.expenses(), before_records);
        prop_assert_eq!(client.pending_snapshot(), before_queue);
    }

    #[test]
    fn queue_order_is_submission_order(payloads in payloads_strategy(10)) {
        let client = TestClient::memory();
        let mut ids = Vec::new();
        for payload in &payloads {
            let record = client.record_expense(payload.clone()).unwrap();
            ids.push(record.id.temp_id().unwrap());
        }

        let queued: Vec<_> = client.pending_snapshot().iter().map(|i| i.temp_id).collect();
        prop_assert_eq!(queued, ids);
    }

    #[test]
    fn temp_ids_stay_unique_across_restarts(first in 0usize..5, second in 1usize..5) {
        let client = TestClient::memory();
        let mut seen = Vec::new();
        for i in 0..first {
            seen.push(client.record_expense(expense_payload(i as i64 + 1, "2024-01-01")).unwrap().id);
        }
        let client = client.reopen();
        for i in 0..second {
            let id = client.record_expense(expense_payload(i as i64 + 1, "2024-01-02")).unwrap().id;
            prop_assert!(!seen.contains(&id));
            seen.push(id);
        }
    }
}

#[test]
fn file_backed_restart_keeps_queue_and_records() {
    let client = TestClient::file();
    client
        .record_expense(expense_payload(4250, "2024-01-01").with_category(3))
        .unwrap();
    client
        .record_expense(expense_payload(1000, "2024-01-02"))
        .unwrap();

    let client = client.reopen();

    assert_eq!(client.queue_len(), 2);
    assert_eq!(client.pending_count(), 2);
    assert_eq!(client.expenses()[0].amount.to_string(), "10.00");
}
