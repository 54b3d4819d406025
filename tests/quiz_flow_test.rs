//! End-to-end quiz taking against the in-memory store, with tokio's
//! paused clock driving the question timers.

mod common;

use chrono::Duration as ChronoDuration;
use common::*;
use eduquiz_backend::error::{DenialReason, Error};
use eduquiz_backend::models::answer::Selection;
use eduquiz_backend::models::question::AnswerChoice;
use eduquiz_backend::services::quiz_engine::{AnswerOutcome, QuizEngine, StartOutcome};
use eduquiz_backend::storage::{MemoryStore, QuizStore};
use std::sync::atomic::Ordering;
use std::time::Duration;

const MENTOR: i64 = 1;
const CHAT: i64 = 500;

#[tokio::test(start_paused = true)]
async fn ranked_quiz_with_timeout_scores_and_rates() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::new();
    let clock = ManualClock::at(base_time());
    let engine = engine_with(&store, transport.clone(), clock.clone());

    let alice = student(1, MENTOR);
    store.insert_student(alice.clone());
    store.insert_quiz(ranked_quiz(10, MENTOR, base_time() + ChronoDuration::days(1)));
    store.insert_question(question(101, 10, 1, AnswerChoice::A));
    store.insert_question(question(102, 10, 2, AnswerChoice::B));
    store.insert_question(question(103, 10, 3, AnswerChoice::C));

    let outcome = engine.start(&alice, 10, CHAT).await.unwrap();
    let StartOutcome::Started { attempt_id, total } = outcome else {
        panic!("expected Started, got {:?}", outcome);
    };
    assert_eq!(total, 3);

    // Q1: correct answer before the countdown runs out.
    let outcome = engine
        .submit_answer(1, attempt_id, 101, AnswerChoice::A)
        .await
        .unwrap();
    assert_eq!(outcome, AnswerOutcome::Next { index: 1, total: 3 });

    // Q2: nobody answers; the 30s timeout records a blank and moves on.
    tokio::time::sleep(Duration::from_secs(35)).await;

    // Q3: wrong answer finishes the attempt.
    let outcome = engine
        .submit_answer(1, attempt_id, 103, AnswerChoice::D)
        .await
        .unwrap();
    let AnswerOutcome::Complete(summary) = outcome else {
        panic!("expected Complete, got {:?}", outcome);
    };
    assert_eq!(summary.score, 1);
    assert_eq!(summary.total, 3);
    assert!(summary.review.is_none(), "ranked quizzes hide answers");

    let answers = store.answers_for_attempt(attempt_id).await.unwrap();
    assert_eq!(answers.len(), 3);
    assert_eq!(answers[0].selected_answer, Selection::A);
    assert!(answers[0].is_correct);
    assert_eq!(answers[1].selected_answer, Selection::Blank);
    assert!(!answers[1].is_correct);
    assert_eq!(answers[2].selected_answer, Selection::D);
    assert!(!answers[2].is_correct);

    let attempt = store.get_attempt(attempt_id).await.unwrap();
    assert!(attempt.is_finished());
    assert_eq!(attempt.score, 1);

    // Streak starts at one on the first ever finished quiz.
    let alice = store.get_student(1).await.unwrap();
    assert_eq!(alice.current_streak, 1);
    assert_eq!(alice.longest_streak, 1);

    // The season was created lazily and the rating recomputed:
    // 1/3 = 33.3%, activity bonus 5% for one quiz, 33.3 * 1.05 = 35.0.
    let season = store.active_season(MENTOR).await.unwrap().unwrap();
    assert_eq!(season.name, "2026-03");
    let ratings = store.season_ratings(season.id).await.unwrap();
    assert_eq!(ratings.len(), 1);
    assert_eq!(ratings[0].total_ranked_quizzes, 1);
    assert_eq!(ratings[0].avg_percentage, 33.3);
    assert_eq!(ratings[0].rating_score, 35.0);

    let texts = transport.sent_texts();
    let result = texts.last().unwrap();
    assert!(result.contains("1/3"), "result message: {}", result);
    assert!(!result.contains("Your answers"));
}

#[tokio::test(start_paused = true)]
async fn duplicate_submission_is_stale_and_practice_gets_review() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::new();
    let clock = ManualClock::at(base_time());
    let engine = engine_with(&store, transport.clone(), clock);

    let bob = student(2, MENTOR);
    store.insert_student(bob.clone());
    store.insert_quiz(practice_quiz(20, MENTOR));
    store.insert_question(question(201, 20, 1, AnswerChoice::A));
    store.insert_question(question(202, 20, 2, AnswerChoice::B));

    let StartOutcome::Started { attempt_id, .. } = engine.start(&bob, 20, CHAT).await.unwrap()
    else {
        panic!("expected Started");
    };

    assert_eq!(
        engine
            .submit_answer(2, attempt_id, 201, AnswerChoice::A)
            .await
            .unwrap(),
        AnswerOutcome::Next { index: 1, total: 2 }
    );

    // A replayed tap for the question that already advanced must not
    // score or move anything.
    assert_eq!(
        engine
            .submit_answer(2, attempt_id, 201, AnswerChoice::B)
            .await
            .unwrap(),
        AnswerOutcome::Stale
    );

    let AnswerOutcome::Complete(summary) = engine
        .submit_answer(2, attempt_id, 202, AnswerChoice::C)
        .await
        .unwrap()
    else {
        panic!("expected Complete");
    };
    assert_eq!(summary.score, 1);
    assert_eq!(summary.total, 2);

    let review = summary.review.expect("practice quizzes return a review");
    assert_eq!(review.len(), 2);
    assert!(review[0].is_correct);
    assert!(!review[1].is_correct);
    assert_eq!(review[1].correct, AnswerChoice::B);

    let result = transport.sent_texts().pop().unwrap();
    assert!(result.contains("Your answers"));

    // No season is created for practice-only play.
    assert!(store.active_season(MENTOR).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn total_is_snapshotted_against_mid_attempt_edits() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::new();
    let clock = ManualClock::at(base_time());
    let engine = engine_with(&store, transport, clock);

    let hana = student(8, MENTOR);
    store.insert_student(hana.clone());
    store.insert_quiz(practice_quiz(80, MENTOR));
    store.insert_question(question(801, 80, 1, AnswerChoice::A));
    store.insert_question(question(802, 80, 2, AnswerChoice::A));

    let StartOutcome::Started { attempt_id, total } = engine.start(&hana, 80, CHAT).await.unwrap()
    else {
        panic!("expected Started");
    };
    assert_eq!(total, 2);

    // A question added mid-attempt must not change this attempt.
    store.insert_question(question(803, 80, 3, AnswerChoice::A));

    engine
        .submit_answer(8, attempt_id, 801, AnswerChoice::A)
        .await
        .unwrap();
    let AnswerOutcome::Complete(summary) = engine
        .submit_answer(8, attempt_id, 802, AnswerChoice::A)
        .await
        .unwrap()
    else {
        panic!("expected Complete");
    };
    assert_eq!(summary.total, 2);
    assert_eq!(summary.score, 2);
    assert_eq!(store.get_attempt(attempt_id).await.unwrap().total, 2);
}

#[tokio::test(start_paused = true)]
async fn expired_window_denies_admission() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::new();
    let clock = ManualClock::at(base_time());
    let engine = engine_with(&store, transport, clock);

    let carol = student(3, MENTOR);
    store.insert_student(carol.clone());
    store.insert_quiz(ranked_quiz(30, MENTOR, base_time() - ChronoDuration::hours(1)));
    store.insert_question(question(301, 30, 1, AnswerChoice::A));

    let err = engine.start(&carol, 30, CHAT).await.unwrap_err();
    assert!(matches!(
        err,
        Error::AdmissionDenied(DenialReason::Expired)
    ));
}

#[tokio::test(start_paused = true)]
async fn exhausted_attempts_return_previous_result() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::new();
    let clock = ManualClock::at(base_time());
    let engine = engine_with(&store, transport, clock);

    let dave = student(4, MENTOR);
    store.insert_student(dave.clone());
    store.insert_quiz(ranked_quiz(40, MENTOR, base_time() + ChronoDuration::days(1)));
    store.insert_question(question(401, 40, 1, AnswerChoice::C));

    let StartOutcome::Started { attempt_id, .. } = engine.start(&dave, 40, CHAT).await.unwrap()
    else {
        panic!("expected Started");
    };
    let AnswerOutcome::Complete(_) = engine
        .submit_answer(4, attempt_id, 401, AnswerChoice::C)
        .await
        .unwrap()
    else {
        panic!("expected Complete");
    };

    // max_attempts is 1; a second start surfaces the previous score.
    assert_eq!(
        engine.start(&dave, 40, CHAT).await.unwrap(),
        StartOutcome::AlreadyCompleted { score: 1, total: 1 }
    );
}

#[tokio::test(start_paused = true)]
async fn second_quiz_during_live_session_is_rejected() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::new();
    let clock = ManualClock::at(base_time());
    let engine = engine_with(&store, transport, clock);

    let erin = student(5, MENTOR);
    store.insert_student(erin.clone());
    store.insert_quiz(practice_quiz(50, MENTOR));
    store.insert_question(question(501, 50, 1, AnswerChoice::A));
    store.insert_quiz(practice_quiz(51, MENTOR));
    store.insert_question(question(511, 51, 1, AnswerChoice::A));

    engine.start(&erin, 50, CHAT).await.unwrap();
    let err = engine.start(&erin, 51, CHAT).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test(start_paused = true)]
async fn stale_session_is_abandoned_on_new_start() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::new();
    let clock = ManualClock::at(base_time());
    let engine = engine_with(&store, transport.clone(), clock.clone());

    let frank = student(6, MENTOR);
    store.insert_student(frank.clone());
    store.insert_quiz(practice_quiz(60, MENTOR));
    store.insert_question(question(601, 60, 1, AnswerChoice::A));
    store.insert_quiz(practice_quiz(61, MENTOR));
    store.insert_question(question(611, 61, 1, AnswerChoice::A));

    let StartOutcome::Started {
        attempt_id: stuck, ..
    } = engine.start(&frank, 60, CHAT).await.unwrap()
    else {
        panic!("expected Started");
    };

    // Past the inactivity limit the lingering session no longer blocks
    // a fresh start; the old attempt stays unfinished and unscored.
    clock.advance(ChronoDuration::minutes(31));
    let outcome = engine.start(&frank, 61, CHAT).await.unwrap();
    assert!(matches!(outcome, StartOutcome::Started { .. }));

    let old = store.get_attempt(stuck).await.unwrap();
    assert!(!old.is_finished());
    assert_eq!(old.score, 0);
    assert!(
        !transport.unpinned.lock().unwrap().is_empty(),
        "abandoned session unpins its question"
    );
}

#[tokio::test(start_paused = true)]
async fn another_students_taps_and_review_requests_are_denied() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::new();
    let clock = ManualClock::at(base_time());
    let engine = engine_with(&store, transport, clock);

    let ivan = student(11, MENTOR);
    let mallory = student(12, MENTOR);
    store.insert_student(ivan.clone());
    store.insert_student(mallory.clone());
    store.insert_quiz(practice_quiz(85, MENTOR));
    store.insert_question(question(851, 85, 1, AnswerChoice::A));

    let StartOutcome::Started { attempt_id, .. } = engine.start(&ivan, 85, CHAT).await.unwrap()
    else {
        panic!("expected Started");
    };

    // A forged tap on someone else's live attempt changes nothing.
    assert_eq!(
        engine
            .submit_answer(mallory.id, attempt_id, 851, AnswerChoice::A)
            .await
            .unwrap(),
        AnswerOutcome::Stale
    );
    assert!(store.answers_for_attempt(attempt_id).await.unwrap().is_empty());

    let AnswerOutcome::Complete(summary) = engine
        .submit_answer(ivan.id, attempt_id, 851, AnswerChoice::A)
        .await
        .unwrap()
    else {
        panic!("expected Complete");
    };
    assert_eq!(summary.score, 1);

    // The finished practice review is owner-only.
    assert!(engine
        .attempt_review(mallory.id, attempt_id)
        .await
        .unwrap()
        .is_none());
    assert!(engine
        .attempt_review(ivan.id, attempt_id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test(start_paused = true)]
async fn timeout_records_blank_even_when_the_store_yields() {
    let mem = MemoryStore::new();
    let transport = RecordingTransport::new();
    let clock = ManualClock::at(base_time());
    let store = InstrumentedStore::wrap(mem.clone());
    let engine = QuizEngine::new(store, transport, clock, test_timing());

    let ivy = student(13, MENTOR);
    mem.insert_student(ivy.clone());
    mem.insert_quiz(practice_quiz(90, MENTOR));
    mem.insert_question(question(901, 90, 1, AnswerChoice::A));

    let StartOutcome::Started { attempt_id, .. } = engine.start(&ivy, 90, CHAT).await.unwrap()
    else {
        panic!("expected Started");
    };

    // Nobody answers. The timeout task suspends inside the answer
    // write; it must survive to finish recording the blank.
    tokio::time::sleep(Duration::from_secs(35)).await;

    let answers = mem.answers_for_attempt(attempt_id).await.unwrap();
    assert_eq!(
        answers.len(),
        1,
        "the timed-out question must have a recorded answer"
    );
    assert_eq!(answers[0].selected_answer, Selection::Blank);
    assert!(mem.get_attempt(attempt_id).await.unwrap().is_finished());
}

#[tokio::test(start_paused = true)]
async fn failed_finalize_drops_the_live_session() {
    let mem = MemoryStore::new();
    let transport = RecordingTransport::new();
    let clock = ManualClock::at(base_time());
    let store = InstrumentedStore::wrap(mem.clone());
    let engine = QuizEngine::new(store.clone(), transport, clock, test_timing());

    let jon = student(14, MENTOR);
    mem.insert_student(jon.clone());
    mem.insert_quiz(practice_quiz(95, MENTOR));
    mem.insert_question(question(951, 95, 1, AnswerChoice::A));
    mem.insert_quiz(practice_quiz(96, MENTOR));
    mem.insert_question(question(961, 96, 1, AnswerChoice::A));

    let StartOutcome::Started { attempt_id, .. } = engine.start(&jon, 95, CHAT).await.unwrap()
    else {
        panic!("expected Started");
    };

    store.fail_finalize.store(true, Ordering::SeqCst);
    engine
        .submit_answer(jon.id, attempt_id, 951, AnswerChoice::A)
        .await
        .unwrap_err();

    // The broken session is cleared right away: the next quiz starts
    // without waiting out the inactivity limit.
    store.fail_finalize.store(false, Ordering::SeqCst);
    let outcome = engine.start(&jon, 96, CHAT).await.unwrap();
    assert!(matches!(outcome, StartOutcome::Started { .. }));
    assert!(!mem.get_attempt(attempt_id).await.unwrap().is_finished());
}

#[tokio::test(start_paused = true)]
async fn streak_grows_across_consecutive_days() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::new();
    let clock = ManualClock::at(base_time());
    let engine = engine_with(&store, transport, clock.clone());

    let gina = student(7, MENTOR);
    store.insert_student(gina.clone());
    store.insert_quiz(practice_quiz(70, MENTOR));
    store.insert_question(question(701, 70, 1, AnswerChoice::A));
    store.insert_quiz(practice_quiz(71, MENTOR));
    store.insert_question(question(711, 71, 1, AnswerChoice::A));

    let StartOutcome::Started { attempt_id, .. } = engine.start(&gina, 70, CHAT).await.unwrap()
    else {
        panic!("expected Started");
    };
    engine
        .submit_answer(7, attempt_id, 701, AnswerChoice::A)
        .await
        .unwrap();
    assert_eq!(store.get_student(7).await.unwrap().current_streak, 1);

    clock.advance(ChronoDuration::days(1));
    let StartOutcome::Started { attempt_id, .. } = engine.start(&gina, 71, CHAT).await.unwrap()
    else {
        panic!("expected Started");
    };
    engine
        .submit_answer(7, attempt_id, 711, AnswerChoice::A)
        .await
        .unwrap();

    let gina = store.get_student(7).await.unwrap();
    assert_eq!(gina.current_streak, 2);
    assert_eq!(gina.longest_streak, 2);
}
