use pretty_assertions::assert_eq;
use relay_core::{
    split_into_batches, EnqueueOutcome, QueueState, SpeechQueue, SpeechQueueConfig,
};

fn queue() -> SpeechQueue {
    SpeechQueue::new(SpeechQueueConfig::default())
}

#[test]
fn backlog_keeps_only_the_newest_segments() {
    let mut queue = queue();
    for i in 0..10 {
        queue.enqueue(&format!("Segment number {i} is here"));
    }

    assert_eq!(queue.len(), 5);
    let kept: Vec<&str> = queue.pending_texts().collect();
    assert_eq!(
        kept,
        vec![
            "Segment number 5 is here",
            "Segment number 6 is here",
            "Segment number 7 is here",
            "Segment number 8 is here",
            "Segment number 9 is here",
        ]
    );
}

#[test]
fn enqueue_reports_dropped_segments() {
    let mut queue = SpeechQueue::new(SpeechQueueConfig {
        backlog_limit: 2,
        ..SpeechQueueConfig::default()
    });
    queue.enqueue("first segment");
    queue.enqueue("second segment");
    assert_eq!(
        queue.enqueue("third segment"),
        EnqueueOutcome::Queued {
            segments: 1,
            dropped: 1
        }
    );
}

#[test]
fn only_one_segment_speaks_at_a_time() {
    let mut queue = queue();
    queue.enqueue("The first sentence");
    queue.enqueue("The second sentence");

    let first = queue.begin_next().expect("first segment");
    assert_eq!(first.text, "The first sentence");
    assert_eq!(queue.state(), QueueState::Speaking(first.id));
    assert!(queue.begin_next().is_none());

    assert!(queue.finish(first.id));
    let second = queue.begin_next().expect("second segment");
    assert_eq!(second.text, "The second sentence");
    assert!(queue.finish(second.id));
    assert!(queue.begin_next().is_none());
    assert!(queue.is_idle());
}

#[test]
fn stale_completion_after_cancel_is_ignored() {
    let mut queue = queue();
    queue.enqueue("Something to say");
    queue.enqueue("Something else to say");
    let playing = queue.begin_next().expect("segment");

    assert_eq!(queue.cancel_all(), Some(playing.id));
    assert!(queue.is_empty());
    assert!(queue.is_idle());
    assert!(!queue.finish(playing.id));

    queue.enqueue("Fresh narration");
    let fresh = queue.begin_next().expect("fresh segment");
    assert_ne!(fresh.id, playing.id);
}

#[test]
fn short_and_status_texts_are_rejected() {
    let mut queue = queue();
    assert_eq!(queue.enqueue("ok"), EnqueueOutcome::Rejected);
    assert_eq!(queue.enqueue("Thinking..."), EnqueueOutcome::Rejected);
    assert_eq!(queue.enqueue("12345 678"), EnqueueOutcome::Rejected);
    assert!(queue.is_empty());
}

#[test]
fn long_text_is_batched_near_target() {
    let text = (0..12)
        .map(|i| format!("This is sentence number {i} of the test."))
        .collect::<Vec<_>>()
        .join(" ");
    let batches = split_into_batches(&text, 150);

    assert!(batches.len() > 1);
    assert!(batches.iter().all(|batch| batch.chars().count() <= 150));
    assert_eq!(batches.join(" "), text);
}

#[test]
fn short_text_is_a_single_batch() {
    assert_eq!(split_into_batches("  Just one.  ", 150), vec!["Just one."]);
}
