use proptest::prelude::*;
use std::time::Instant;

use conference_queue::{ClientQueue, EntryId, QueueEntry, RenderState, TeacherId, TeacherQueue};

#[derive(Debug, Clone)]
enum Op {
    Complete,
    Skip,
    Confirm(usize),
    Enqueue(u32),
    Remove(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Complete),
        Just(Op::Skip),
        (0usize..12).prop_map(Op::Confirm),
        (0u32..1000).prop_map(Op::Enqueue),
        (0usize..12).prop_map(Op::Remove),
    ]
}

/// A valid starting queue: n parties, optionally the first one current.
fn arb_queue() -> impl Strategy<Value = TeacherQueue> {
    (0usize..8, any::<bool>()).prop_map(|(n, with_current)| {
        let entries = (0..n)
            .map(|i| {
                let id = format!("p{i}");
                let name = format!("Parent {i}");
                if i == 0 && with_current {
                    QueueEntry::current(id, name)
                } else {
                    QueueEntry::waiting(id, name)
                }
            })
            .collect();
        TeacherQueue::from_entries(entries).unwrap()
    })
}

fn apply(queue: &TeacherQueue, op: &Op) -> TeacherQueue {
    let nth = |i: usize| queue.entries().get(i).map(|e| e.id.clone());
    let result = match op {
        Op::Complete => queue.complete(None),
        Op::Skip => queue.skip(None),
        Op::Confirm(i) => match nth(*i) {
            Some(id) => queue.confirm_promotion(&id),
            None => return queue.clone(),
        },
        Op::Enqueue(n) => queue.enqueue(QueueEntry::waiting(format!("n{n}"), "New"), Some(10)),
        Op::Remove(i) => match nth(*i) {
            Some(id) => queue.remove(&id),
            None => return queue.clone(),
        },
    };
    match result {
        Ok((next, _)) => next,
        Err(_) => queue.clone(),
    }
}

fn waiting_ids(queue: &TeacherQueue) -> Vec<EntryId> {
    queue.waiting().map(|e| e.id.clone()).collect()
}

proptest! {
    #[test]
    fn at_most_one_current(start in arb_queue(), ops in proptest::collection::vec(arb_op(), 0..40)) {
        let mut queue = start;
        for op in &ops {
            queue = apply(&queue, op);
            let currents = queue.entries().iter().filter(|e| e.is_current()).count();
            prop_assert!(currents <= 1);
            if currents == 1 {
                prop_assert!(queue.entries()[0].is_current());
            }
        }
    }

    #[test]
    fn ids_stay_unique(start in arb_queue(), ops in proptest::collection::vec(arb_op(), 0..40)) {
        let mut queue = start;
        for op in &ops {
            queue = apply(&queue, op);
            let mut ids: Vec<_> = queue.entries().iter().map(|e| e.id.clone()).collect();
            let before = ids.len();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), before);
        }
    }

    #[test]
    fn complete_preserves_waiting_order(start in arb_queue()) {
        prop_assume!(start.current().is_some());
        let before = waiting_ids(&start);
        let (next, _) = start.complete(None).unwrap();
        match before.split_first() {
            Some((promoted, rest)) => {
                prop_assert_eq!(next.current().map(|e| e.id.clone()), Some(promoted.clone()));
                prop_assert_eq!(waiting_ids(&next), rest.to_vec());
            }
            None => prop_assert!(next.is_empty()),
        }
    }

    #[test]
    fn skip_moves_current_to_second_position(start in arb_queue()) {
        prop_assume!(start.current().is_some());
        let old_current = start.current().unwrap().id.clone();
        let before = waiting_ids(&start);
        let (next, _) = start.skip(None).unwrap();

        match before.split_first() {
            Some((head, rest)) => {
                prop_assert_eq!(next.current().map(|e| e.id.clone()), Some(head.clone()));
                let mut expected = vec![old_current];
                expected.extend_from_slice(rest);
                prop_assert_eq!(waiting_ids(&next), expected);
            }
            None => {
                prop_assert_eq!(next.entries(), start.entries());
                prop_assert!(next.entries()[0].is_current());
            }
        }
    }

    #[test]
    fn snapshot_round_trip_renders_identically(start in arb_queue(), ops in proptest::collection::vec(arb_op(), 0..20)) {
        let mut queue = start;
        for op in &ops {
            queue = apply(&queue, op);
        }
        let wire = serde_json::to_string(&queue.to_vec()).unwrap();
        let decoded: Vec<QueueEntry> = serde_json::from_str(&wire).unwrap();

        let mut client = ClientQueue::new(TeacherId::from("t1"));
        client.apply_snapshot(decoded);
        prop_assert_eq!(client.local(), queue.entries());
        prop_assert_eq!(
            RenderState::build(client.local(), None),
            RenderState::build(queue.entries(), None)
        );
    }

    #[test]
    fn rejected_promotion_never_storms(n in 1usize..6, passes in 1usize..10) {
        let entries: Vec<_> = (0..n).map(|i| QueueEntry::waiting(format!("p{i}"), "P")).collect();
        let mut client = ClientQueue::new(TeacherId::from("t1"));
        client.apply_snapshot(entries);

        let candidate = client.render_pass(Instant::now()).unwrap();
        prop_assert!(client.begin_confirmation(&candidate));
        client.apply_rejection(Some(&candidate));

        for _ in 0..passes {
            prop_assert!(client.render_pass(Instant::now()).is_none());
        }
        prop_assert!(client.local().iter().all(|e| e.is_waiting()));
    }
}
