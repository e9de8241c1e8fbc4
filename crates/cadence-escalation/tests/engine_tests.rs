//! Engine-level behavior: transport failures, retry scope, rule edits
//! under running chains, delivery confirmations, analytics, and paging.

use cadence_escalation::{
    ChainStatus, Channel, EndReason, EngineConfig, EscalationEngine, EscalationError,
    EscalationStep, LogFilter, LogStatus, RetryScope, RuleId, TargetRef, TargetType, Tone,
    TriggerType,
};
use cadence_test_utils::{init_test_logging, single_step_rule, ts, two_step_rule, RecordingSender};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn engine_with(config: EngineConfig) -> (Arc<EscalationEngine>, Arc<RecordingSender>) {
    init_test_logging();
    let sender = Arc::new(RecordingSender::new());
    let engine = Arc::new(EscalationEngine::new(config, sender.clone()));
    (engine, sender)
}

fn target() -> TargetRef {
    TargetRef::new(TargetType::ActionItem, "ai-7")
}

#[tokio::test]
async fn transport_failure_retries_without_consuming_the_step() {
    let (engine, sender) = engine_with(EngineConfig::default());
    let rule_id = engine.create_rule(single_step_rule()).unwrap();
    engine
        .start_chain(target(), rule_id, "owner@example.com", ts(0))
        .unwrap();

    sender.fail_next(1);
    assert_eq!(engine.advance(ts(0)).await, 0);

    let chain = engine.chain(&target(), rule_id).unwrap();
    assert_eq!(chain.status, ChainStatus::Pending);
    assert_eq!(chain.attempts_at_current_step, 0);
    assert_eq!(chain.transport_failures, 1);

    // next tick lands the send; the step was not consumed by the failure
    assert_eq!(engine.advance(ts(1)).await, 1);
    let chain = engine.chain(&target(), rule_id).unwrap();
    assert_eq!(chain.status, ChainStatus::Sent);
    assert_eq!(chain.attempts_at_current_step, 1);
    assert_eq!(chain.transport_failures, 0);

    let failed = engine.logs(&LogFilter::new().with_status(LogStatus::Failed));
    assert_eq!(failed.len(), 1);
    let sent = engine.logs(&LogFilter::new().with_status(LogStatus::Sent));
    assert_eq!(sent.len(), 1);
}

#[tokio::test]
async fn transport_retry_ceiling_terminates_the_chain() {
    let config = EngineConfig::default().with_max_transport_retries(2);
    let (engine, sender) = engine_with(config);
    let rule_id = engine.create_rule(single_step_rule()).unwrap();
    engine
        .start_chain(target(), rule_id, "owner@example.com", ts(0))
        .unwrap();

    sender.fail_next(10);
    assert_eq!(engine.advance(ts(0)).await, 0);
    assert_eq!(engine.advance(ts(1)).await, 0);

    let chain = engine.chain(&target(), rule_id).unwrap();
    assert_eq!(chain.status, ChainStatus::Cancelled);
    assert_eq!(chain.end_reason, Some(EndReason::DeliveryFailed));

    // dead chain is skipped afterwards
    assert_eq!(engine.advance(ts(2)).await, 0);
    assert_eq!(
        engine.logs(&LogFilter::new().with_status(LogStatus::Failed)).len(),
        2
    );
    assert_eq!(sender.sent_count(), 0);
}

#[tokio::test]
async fn pause_issued_mid_flight_survives_the_commit() {
    let (engine, sender) = engine_with(EngineConfig::default());
    sender.set_send_delay(Duration::from_millis(200));
    let rule_id = engine.create_rule(single_step_rule()).unwrap();
    engine
        .start_chain(target(), rule_id, "owner@example.com", ts(0))
        .unwrap();

    // pause lands while the sender still holds the dispatch open
    let tick = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.advance(ts(0)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.pause(target(), rule_id, ts(0)).unwrap();
    assert_eq!(tick.await.unwrap(), 1);

    // the chain stays frozen; the outcome waits in the saved status
    let chain = engine.chain(&target(), rule_id).unwrap();
    assert_eq!(chain.status, ChainStatus::Paused);
    assert_eq!(chain.resume_status, Some(ChainStatus::Sent));
    assert_eq!(chain.attempts_at_current_step, 1);
    assert_eq!(sender.sent_count(), 1);

    engine.resume(target(), rule_id, ts(1)).unwrap();
    let chain = engine.chain(&target(), rule_id).unwrap();
    assert_eq!(chain.status, ChainStatus::Sent);
}

#[tokio::test]
async fn send_failure_mid_pause_does_not_cancel_the_frozen_chain() {
    let config = EngineConfig::default().with_max_transport_retries(1);
    let (engine, sender) = engine_with(config);
    sender.set_send_delay(Duration::from_millis(200));
    sender.fail_next(1);
    let rule_id = engine.create_rule(single_step_rule()).unwrap();
    engine
        .start_chain(target(), rule_id, "owner@example.com", ts(0))
        .unwrap();

    let tick = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.advance(ts(0)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.pause(target(), rule_id, ts(0)).unwrap();
    assert_eq!(tick.await.unwrap(), 0);

    // the failure is counted but the frozen chain is not terminated
    let chain = engine.chain(&target(), rule_id).unwrap();
    assert_eq!(chain.status, ChainStatus::Paused);
    assert_eq!(chain.end_reason, None);
    assert_eq!(chain.transport_failures, 1);
}

#[tokio::test]
async fn unreachable_recipient_terminates_without_burning_retries() {
    let (engine, sender) = engine_with(EngineConfig::default());
    let rule_id = engine.create_rule(single_step_rule()).unwrap();
    engine
        .start_chain(target(), rule_id, "owner@example.com", ts(0))
        .unwrap();

    sender.fail_unreachable_next(1);
    assert_eq!(engine.advance(ts(0)).await, 0);

    let chain = engine.chain(&target(), rule_id).unwrap();
    assert_eq!(chain.status, ChainStatus::Cancelled);
    assert_eq!(chain.end_reason, Some(EndReason::DeliveryFailed));
    assert_eq!(
        engine.logs(&LogFilter::new().with_status(LogStatus::Failed)).len(),
        1
    );
}

#[tokio::test]
async fn shrinking_a_rule_clamps_running_chains() {
    let (engine, _sender) = engine_with(EngineConfig::default());
    let rule = two_step_rule()
        .with_step(EscalationStep::new(3, Channel::Phone, 0, Tone::Urgent))
        .with_cooldown(10);
    let rule_id = engine.create_rule(rule).unwrap();
    engine
        .start_chain(target(), rule_id, "owner@example.com", ts(0))
        .unwrap();

    // run into step 2
    engine.advance(ts(0)).await;
    engine.advance(ts(10)).await;
    engine.advance(ts(70)).await;
    let chain = engine.chain(&target(), rule_id).unwrap();
    assert_eq!(chain.current_step, 2);
    assert_eq!(chain.status, ChainStatus::Sent);

    // replace with a one-step rule while the chain is mid-flight
    engine.update_rule(rule_id, single_step_rule()).unwrap();

    // next decision clamps to the shorter list and exhausts cleanly
    engine.advance(ts(100)).await;
    let chain = engine.chain(&target(), rule_id).unwrap();
    assert_eq!(chain.current_step, 1);
    assert_eq!(chain.status, ChainStatus::Cancelled);
    assert_eq!(chain.end_reason, Some(EndReason::Exhausted));
}

#[tokio::test]
async fn deleting_a_rule_cancels_running_chains_at_next_decision() {
    let (engine, _sender) = engine_with(EngineConfig::default());
    let rule_id = engine.create_rule(two_step_rule()).unwrap();
    engine
        .start_chain(target(), rule_id, "owner@example.com", ts(0))
        .unwrap();
    engine.advance(ts(0)).await;

    engine.delete_rule(rule_id).unwrap();
    engine.advance(ts(30)).await;

    let chain = engine.chain(&target(), rule_id).unwrap();
    assert_eq!(chain.status, ChainStatus::Cancelled);
}

#[tokio::test]
async fn per_chain_retry_scope_spends_budget_across_steps() {
    let config = EngineConfig::default().with_retry_scope(RetryScope::PerChain);
    let (engine, sender) = engine_with(config);
    let rule = two_step_rule().with_max_retries(3).with_cooldown(10);
    let rule_id = engine.create_rule(rule).unwrap();
    engine
        .start_chain(target(), rule_id, "owner@example.com", ts(0))
        .unwrap();

    for minutes in 0..=120 {
        engine.advance(ts(minutes)).await;
    }

    // three email attempts burn the chain budget, then one SMS, then done
    let channels: Vec<Channel> = sender.sent().iter().map(|m| m.channel).collect();
    assert_eq!(
        channels,
        vec![Channel::Email, Channel::Email, Channel::Email, Channel::Sms]
    );
    let chain = engine.chain(&target(), rule_id).unwrap();
    assert_eq!(chain.end_reason, Some(EndReason::Exhausted));
}

#[tokio::test]
async fn delivery_confirmation_marks_chain_and_row() {
    let (engine, _sender) = engine_with(EngineConfig::default());
    let rule_id = engine.create_rule(two_step_rule()).unwrap();
    engine
        .start_chain(target(), rule_id, "owner@example.com", ts(0))
        .unwrap();
    engine.advance(ts(0)).await;

    let row = engine.logs(&LogFilter::new()).remove(0);
    engine.mark_delivered(row.id, ts(2)).unwrap();

    let chain = engine.chain(&target(), rule_id).unwrap();
    assert_eq!(chain.status, ChainStatus::Delivered);
    let row = engine.log_row(row.id).unwrap();
    assert_eq!(row.status, LogStatus::Delivered);
    assert_eq!(row.delivered_at, Some(ts(2)));

    // a delivered chain still advances after cooldown
    engine.advance(ts(30)).await;
    let chain = engine.chain(&target(), rule_id).unwrap();
    assert_eq!(chain.current_step, 2);
}

#[tokio::test]
async fn stale_delivery_confirmation_leaves_an_advanced_chain_alone() {
    let (engine, _sender) = engine_with(EngineConfig::default());
    let rule_id = engine.create_rule(two_step_rule()).unwrap();
    engine
        .start_chain(target(), rule_id, "owner@example.com", ts(0))
        .unwrap();
    engine.advance(ts(0)).await;
    let step_one = engine.logs(&LogFilter::new()).remove(0);

    // the chain advances and dispatches step 2 before the receipt arrives
    engine.advance(ts(30)).await;
    engine.advance(ts(90)).await;
    engine.mark_delivered(step_one.id, ts(95)).unwrap();

    // audit row is patched; the chain keeps its step-2 state
    let row = engine.log_row(step_one.id).unwrap();
    assert_eq!(row.delivered_at, Some(ts(95)));
    let chain = engine.chain(&target(), rule_id).unwrap();
    assert_eq!(chain.current_step, 2);
    assert_eq!(chain.status, ChainStatus::Sent);
}

#[tokio::test]
async fn response_while_delivered_resolves_the_chain() {
    let (engine, sender) = engine_with(EngineConfig::default());
    let rule_id = engine.create_rule(two_step_rule()).unwrap();
    engine
        .start_chain(target(), rule_id, "owner@example.com", ts(0))
        .unwrap();
    engine.advance(ts(0)).await;

    let row = engine.logs(&LogFilter::new()).remove(0);
    engine.mark_delivered(row.id, ts(2)).unwrap();
    engine.record_response(row.id, None, ts(5)).unwrap();

    let chain = engine.chain(&target(), rule_id).unwrap();
    assert_eq!(chain.status, ChainStatus::Responded);
    for minutes in 6..=120 {
        assert_eq!(engine.advance(ts(minutes)).await, 0);
    }
    assert_eq!(sender.sent_count(), 1);
}

#[tokio::test]
async fn control_operations_on_unknown_chain_fail() {
    let (engine, _sender) = engine_with(EngineConfig::default());
    let err = engine.pause(target(), RuleId::new(), ts(0)).unwrap_err();
    assert!(matches!(err, EscalationError::ChainNotFound { .. }));
    let err = engine.cancel(target(), RuleId::new()).unwrap_err();
    assert!(matches!(err, EscalationError::ChainNotFound { .. }));
}

#[tokio::test]
async fn analytics_reflect_dispatches_and_responses() {
    let (engine, _sender) = engine_with(EngineConfig::default());
    let rule_id = engine.create_rule(two_step_rule()).unwrap();
    engine
        .start_chain(target(), rule_id, "owner@example.com", ts(0))
        .unwrap();
    let other = TargetRef::new(TargetType::Commitment, "c-9");
    engine
        .start_chain(other.clone(), rule_id, "owner@example.com", ts(0))
        .unwrap();

    engine.advance(ts(0)).await;
    let row = engine
        .logs(&LogFilter::new().with_target_type(TargetType::ActionItem))
        .remove(0);
    engine.record_response(row.id, None, ts(10)).unwrap();

    let analytics = engine.analytics(7, ts(20));
    assert_eq!(analytics.total_escalations, 2);
    let sum: u64 = analytics.by_channel.values().sum();
    assert_eq!(sum, analytics.total_escalations);
    assert!((analytics.response_rate - 0.5).abs() < f64::EPSILON);
    assert!((analytics.average_response_time_minutes - 10.0).abs() < f64::EPSILON);
    assert_eq!(analytics.active_chains, 1);
    assert_eq!(analytics.resolved_by_response, 1);
}

#[tokio::test]
async fn analytics_on_empty_engine_are_all_zero() {
    let (engine, _sender) = engine_with(EngineConfig::default());
    let analytics = engine.analytics(30, ts(0));
    assert_eq!(analytics.total_escalations, 0);
    assert_eq!(analytics.response_rate, 0.0);
    assert_eq!(analytics.active_chains, 0);
}

#[tokio::test]
async fn log_queries_filter_and_page_through_the_engine() {
    let (engine, _sender) = engine_with(EngineConfig::default());
    let rule_id = engine.create_rule(two_step_rule()).unwrap();

    for i in 0..5 {
        let t = TargetRef::new(TargetType::MeetingPrep, format!("mtg-{i}"));
        engine
            .start_chain(t, rule_id, "owner@example.com", ts(0))
            .unwrap();
    }
    engine.advance(ts(0)).await;

    let all = engine.logs(&LogFilter::new());
    assert_eq!(all.len(), 5);

    let page = engine.logs(&LogFilter::new().with_page(2, 2));
    assert_eq!(page.len(), 2);

    let emails = engine.logs(
        &LogFilter::new()
            .with_channel(Channel::Email)
            .with_target_type(TargetType::MeetingPrep),
    );
    assert_eq!(emails.len(), 5);
    let sms = engine.logs(&LogFilter::new().with_channel(Channel::Sms));
    assert!(sms.is_empty());
}

#[tokio::test]
async fn invalid_rules_are_rejected_before_any_side_effect() {
    let (engine, _sender) = engine_with(EngineConfig::default());

    let no_steps = cadence_escalation::EscalationRule::new("u", "bad", TriggerType::Custom);
    assert!(engine.create_rule(no_steps).is_err());

    let bad_retries = single_step_rule().with_max_retries(21);
    assert!(engine.create_rule(bad_retries).is_err());

    assert!(engine.list_rules().is_empty());
    assert!(engine.logs(&LogFilter::new()).is_empty());
}
