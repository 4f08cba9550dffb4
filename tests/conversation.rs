//! Conversation buffer integration tests

use carebot::{Role, Turn};

mod common;

fn add_pair(conversation: &mut carebot::Conversation, n: usize) {
    conversation.append(Turn::user(format!("question {n}")));
    conversation.append(Turn::assistant(format!("answer {n}")));
}

#[test]
fn test_evicts_oldest_pair_after_priming() {
    let (mut conversation, dir) = common::conversation(3000, 1);
    for n in 1..=3 {
        add_pair(&mut conversation, n);
    }
    assert_eq!(conversation.len(), 8);

    let evicted = conversation.evict_if_over_budget(3001);

    assert_eq!(evicted, 1);
    assert_eq!(conversation.len(), 6);
    assert_eq!(conversation.priming(), common::priming().as_slice());
    assert_eq!(conversation.turns()[2].content(), "question 2");

    let log = common::read_log(&dir);
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("] user: question 1"));
    assert!(lines[1].ends_with("] assistant: answer 1"));
}

#[test]
fn test_grows_one_pair_per_turn_within_budget() {
    let (mut conversation, dir) = common::conversation(3000, 2);

    for n in 1..=5 {
        let before = conversation.len();
        add_pair(&mut conversation, n);
        assert_eq!(conversation.evict_if_over_budget(3000), 0);
        assert_eq!(conversation.len(), before + 2);
    }

    assert_eq!(conversation.pair_count(), 5);
    assert!(common::read_log(&dir).is_empty());
}

#[test]
fn test_priming_survives_repeated_eviction() {
    let (mut conversation, _dir) = common::conversation(100, 2);

    for n in 1..=10 {
        add_pair(&mut conversation, n);
        conversation.evict_if_over_budget(10_000);
        assert_eq!(conversation.priming(), common::priming().as_slice());
        assert_eq!(conversation.history().len() % 2, 0);
    }

    // Never more pairs removed than exist
    assert_eq!(conversation.pair_count(), 0);
    assert_eq!(conversation.len(), 2);
}

#[test]
fn test_clear_pairs_caps_at_available() {
    let (mut conversation, dir) = common::conversation(100, 5);
    add_pair(&mut conversation, 1);
    add_pair(&mut conversation, 2);

    assert_eq!(conversation.evict_if_over_budget(101), 2);
    assert_eq!(conversation.len(), 2);
    assert_eq!(common::read_log(&dir).lines().count(), 4);
}

#[test]
fn test_history_alternates_roles() {
    let (mut conversation, _dir) = common::conversation(100, 1);
    for n in 1..=4 {
        add_pair(&mut conversation, n);
    }
    conversation.evict_if_over_budget(500);

    for (i, turn) in conversation.history().iter().enumerate() {
        let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
        assert_eq!(turn.role(), expected);
    }
}

#[test]
fn test_flush_writes_history_only() {
    let (mut conversation, dir) = common::conversation(3000, 1);
    add_pair(&mut conversation, 1);

    conversation.flush_to_log();

    let log = common::read_log(&dir);
    assert_eq!(log.lines().count(), 2);
    assert!(!log.contains("elderly caretaker"));
}
