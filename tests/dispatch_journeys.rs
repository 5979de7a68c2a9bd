//! Behavior-driven tests for conversational turns
//!
//! These tests verify WHAT a user gets back for a question: which tool ran, how failures are
//! worded, what provenance notes are attached, and how turns of one conversation interleave.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ferrotalk_agent::{
    Dispatcher, FailureKind, IntentInterpreter, InterpretFuture, Interpretation,
    KeywordInterpreter, SearchError, SearchFuture, ToolCall, ToolDescriptor, ToolExecutor,
    TurnError, TurnReply, TurnState, WebSearch,
};
use ferrotalk_core::{LookbackTolerance, ProviderErrorKind, ProviderId, RetrievalCoordinator};
use serde_json::json;
use support::{bar, daily_closes, Behavior, FakeProvider};
use time::macros::date;

struct Scripted(Interpretation);

impl IntentInterpreter for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn interpret<'a>(&'a self, _: &'a str, _: &'a [ToolDescriptor]) -> InterpretFuture<'a> {
        let interpretation = self.0.clone();
        Box::pin(async move { Ok(interpretation) })
    }
}

/// Records how many interpretations overlap.
#[derive(Default)]
struct Overlap {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl IntentInterpreter for Overlap {
    fn name(&self) -> &'static str {
        "overlap"
    }

    fn interpret<'a>(&'a self, _: &'a str, _: &'a [ToolDescriptor]) -> InterpretFuture<'a> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Interpretation::PlainAnswer(String::from("ok")))
        })
    }
}

struct CannedSearch(Result<String, SearchError>);

impl WebSearch for CannedSearch {
    fn search<'a>(&'a self, _: &'a str) -> SearchFuture<'a> {
        let outcome = self.0.clone();
        Box::pin(async move { outcome })
    }
}

struct Harness {
    primary: Arc<FakeProvider>,
    secondary: Arc<FakeProvider>,
    dispatcher: Arc<Dispatcher>,
}

fn week_of_closes() -> Behavior {
    Behavior::Closes(daily_closes(
        date!(2024 - 03 - 04),
        &[100.0, 110.0, 120.0, 130.0, 182.5],
    ))
}

fn harness_with(
    primary: Arc<FakeProvider>,
    secondary: Arc<FakeProvider>,
    interpreter: Arc<dyn IntentInterpreter>,
    search: Option<Arc<dyn WebSearch>>,
) -> Harness {
    let coordinator = RetrievalCoordinator::new(primary.clone(), secondary.clone());
    let mut executor = ToolExecutor::new(coordinator).with_today(date!(2024 - 03 - 08));
    if let Some(search) = search {
        executor = executor.with_web_search(search);
    }
    Harness {
        primary,
        secondary,
        dispatcher: Arc::new(Dispatcher::new(interpreter, executor)),
    }
}

fn keyword_harness(primary: Behavior, secondary: Behavior) -> Harness {
    harness_with(
        FakeProvider::new(ProviderId::Yahoo, primary),
        FakeProvider::new(ProviderId::Alphavantage, secondary),
        Arc::new(KeywordInterpreter::new()),
        None,
    )
}

fn failure_kind(reply: &TurnReply) -> Option<FailureKind> {
    reply.result.as_ref().and_then(|result| result.failure_kind())
}

// =============================================================================
// Journey: arithmetic
// =============================================================================

#[tokio::test]
async fn user_asks_for_a_percentage_of_a_number() {
    // Given: A dispatcher with keyword routing
    let harness = keyword_harness(week_of_closes(), week_of_closes());

    // When: The user asks "What's 15% of 250?"
    let reply = harness
        .dispatcher
        .handle_turn("c1", "What's 15% of 250?")
        .await;

    // Then: The arithmetic tool ran with base first, and the answer is 37.5
    assert_eq!(
        reply.tool_call,
        Some(ToolCall::new(
            "arithmetic",
            json!({"op": "percent_of", "operands": [250.0, 15.0]})
        ))
    );
    assert!(reply.text.contains("37.5"), "reply: {}", reply.text);
    assert_eq!(reply.trace.last(), Some(&TurnState::Done));
    assert_eq!(harness.primary.calls(), 0);
}

#[tokio::test]
async fn user_divides_by_zero_and_gets_a_clear_refusal() {
    let harness = keyword_harness(week_of_closes(), week_of_closes());

    let reply = harness.dispatcher.handle_turn("c1", "what is 10 / 0").await;

    assert_eq!(failure_kind(&reply), Some(FailureKind::DivisionByZero));
    assert!(reply.text.contains("divide by zero"));
}

// =============================================================================
// Journey: prices
// =============================================================================

#[tokio::test]
async fn user_asks_for_a_stock_price_by_company_name() {
    // Given: A healthy primary provider
    let harness = keyword_harness(week_of_closes(), week_of_closes());

    // When: The user asks about Apple
    let reply = harness
        .dispatcher
        .handle_turn("c1", "What's the price of Apple right now?")
        .await;

    // Then: The latest close of AAPL is reported with no provenance notes
    assert!(reply.text.contains("AAPL"), "reply: {}", reply.text);
    assert!(reply.text.contains("182.50"), "reply: {}", reply.text);
    assert!(!reply.text.contains("Note:"));
    assert_eq!(harness.primary.requested_symbols(), vec!["AAPL"]);
    assert_eq!(harness.secondary.calls(), 0);
}

#[tokio::test]
async fn user_asks_for_bitcoin_and_the_usd_pair_is_fetched() {
    let harness = keyword_harness(week_of_closes(), week_of_closes());

    let reply = harness
        .dispatcher
        .handle_turn("c1", "how much is bitcoin worth?")
        .await;

    assert_eq!(harness.primary.requested_symbols(), vec!["BTC-USD"]);
    assert!(reply.text.contains("USD"), "reply: {}", reply.text);
}

#[tokio::test]
async fn user_asks_for_key_stats_of_a_stock() {
    // Given: A year of bars whose extremes fall on different days
    let bars = vec![
        bar(date!(2023 - 06 - 14), 95.0, 104.0, 101.0, 40_000_000),
        bar(date!(2024 - 01 - 10), 150.0, 190.0, 185.0, 61_000_000),
        bar(date!(2024 - 03 - 07), 128.0, 133.0, 130.0, 58_000_000),
        bar(date!(2024 - 03 - 08), 176.0, 183.0, 182.5, 52_345_678),
    ];
    let harness = keyword_harness(Behavior::Bars(bars.clone()), Behavior::Bars(bars));

    // When: The user asks about Apple in general
    let reply = harness
        .dispatcher
        .handle_turn("c1", "Tell me about Apple")
        .await;

    // Then: Latest and previous close, volume and the 52-week range are reported
    assert_eq!(
        reply.tool_call,
        Some(ToolCall::new("get_stock_info", json!({"symbol": "AAPL"})))
    );
    assert!(reply.text.contains("closed at 182.50 on 2024-03-08"), "reply: {}", reply.text);
    assert!(reply.text.contains("previous close 130.00"), "reply: {}", reply.text);
    assert!(reply.text.contains("Volume 52345678"), "reply: {}", reply.text);
    assert!(reply.text.contains("52-week range 95.00 to 190.00"), "reply: {}", reply.text);
    assert!(!reply.text.contains("Note:"));
}

#[tokio::test]
async fn key_stats_from_the_backup_provider_are_disclosed() {
    let harness = keyword_harness(
        Behavior::Fail(ProviderErrorKind::TransientIo),
        week_of_closes(),
    );

    let reply = harness
        .dispatcher
        .handle_turn("c1", "MSFT stats")
        .await;

    // Closes stand in for the missing highs and lows.
    assert!(reply.text.contains("52-week range 100.00 to 182.50"), "reply: {}", reply.text);
    assert!(reply.text.contains("backup provider (Alpha Vantage)"), "reply: {}", reply.text);
}

#[tokio::test]
async fn user_asks_for_the_close_on_a_weekend_date() {
    // Given: Sessions on Thursday and Friday, then nothing until Monday
    let closes = Behavior::Closes(vec![
        (date!(2024 - 02 - 29), Some(790.0)),
        (date!(2024 - 03 - 01), Some(800.0)),
        (date!(2024 - 03 - 04), Some(850.0)),
    ]);
    let harness = keyword_harness(closes.clone(), closes);

    // When: The price on Sunday is requested
    let reply = harness
        .dispatcher
        .handle_turn("c1", "What was the price of AAPL on 2024-03-03?")
        .await;

    // Then: Friday's close answers and the shift is disclosed
    assert_eq!(
        reply.tool_call,
        Some(ToolCall::new(
            "get_stock_price",
            json!({"symbol": "AAPL", "date": "2024-03-03"})
        ))
    );
    assert!(reply.text.contains("closed at 800.00 on 2024-03-01"), "reply: {}", reply.text);
    assert!(reply.text.contains("No trading data on 2024-03-03"), "reply: {}", reply.text);
}

#[tokio::test]
async fn a_close_in_the_future_is_refused_before_any_fetch() {
    let harness = keyword_harness(week_of_closes(), week_of_closes());

    let reply = harness
        .dispatcher
        .handle_turn("c1", "price of AAPL on 2024-03-09")
        .await;

    assert_eq!(failure_kind(&reply), Some(FailureKind::InvalidArguments));
    assert!(reply.text.contains("in the future"), "reply: {}", reply.text);
    assert_eq!(harness.primary.calls(), 0);
}

#[tokio::test]
async fn fallback_and_granularity_downgrade_are_disclosed() {
    // Given: A throttled primary and a daily-only secondary
    let harness = harness_with(
        FakeProvider::new(ProviderId::Yahoo, Behavior::Fail(ProviderErrorKind::RateLimited)),
        FakeProvider::daily_only(ProviderId::Alphavantage, week_of_closes()),
        Arc::new(KeywordInterpreter::new()),
        None,
    );

    // When: The user asks for a live price
    let reply = harness.dispatcher.handle_turn("c1", "price of MSFT").await;

    // Then: The answer carries both provenance notes
    assert!(reply.text.contains("182.50"), "reply: {}", reply.text);
    assert!(reply.text.contains("backup provider (Alpha Vantage)"), "reply: {}", reply.text);
    assert!(reply.text.contains("only had daily data, not realtime"), "reply: {}", reply.text);
    assert_eq!(harness.secondary.calls(), 1);
}

// =============================================================================
// Journey: failures the user can act on
// =============================================================================

#[tokio::test]
async fn unknown_symbol_and_provider_outage_read_differently() {
    // Given: One setup where the symbol is unknown, one where both providers are down
    let unknown = keyword_harness(
        Behavior::Fail(ProviderErrorKind::SymbolNotFound),
        week_of_closes(),
    );
    let outage = keyword_harness(
        Behavior::Fail(ProviderErrorKind::TransientIo),
        Behavior::Fail(ProviderErrorKind::RateLimited),
    );

    // When: The same question is asked of both
    let not_found = unknown.dispatcher.handle_turn("c1", "price of ZZZZ").await;
    let unavailable = outage.dispatcher.handle_turn("c1", "price of ZZZZ").await;

    // Then: The user is told to check the symbol in one case and to retry in the other
    assert_eq!(failure_kind(&not_found), Some(FailureKind::SymbolNotFound));
    assert_eq!(failure_kind(&unavailable), Some(FailureKind::ProviderUnavailable));
    assert!(not_found.text.contains("check the ticker"));
    assert!(unavailable.text.contains("try again"));
    assert_ne!(not_found.text, unavailable.text);
    assert_eq!(unknown.secondary.calls(), 0);
}

#[tokio::test]
async fn interpreter_picking_an_unknown_tool_is_reported() {
    let harness = harness_with(
        FakeProvider::new(ProviderId::Yahoo, week_of_closes()),
        FakeProvider::new(ProviderId::Alphavantage, week_of_closes()),
        Arc::new(Scripted(Interpretation::ToolCall(ToolCall::new(
            "get_company_profile",
            json!({"symbol": "AAPL"}),
        )))),
        None,
    );

    let reply = harness
        .dispatcher
        .handle_turn("c1", "show the company profile of Apple")
        .await;

    assert_eq!(failure_kind(&reply), Some(FailureKind::UnknownTool));
    assert!(reply.text.contains("get_company_profile"));
    assert_eq!(harness.primary.calls(), 0);
}

#[tokio::test]
async fn invalid_arguments_are_rejected_before_any_fetch() {
    let harness = harness_with(
        FakeProvider::new(ProviderId::Yahoo, week_of_closes()),
        FakeProvider::new(ProviderId::Alphavantage, week_of_closes()),
        Arc::new(Scripted(Interpretation::ToolCall(ToolCall::new(
            "get_stock_price",
            json!({"ticker": "AAPL"}),
        )))),
        None,
    );

    let reply = harness.dispatcher.handle_turn("c1", "price of AAPL").await;

    assert_eq!(failure_kind(&reply), Some(FailureKind::InvalidArguments));
    assert!(reply.text.contains("ticker"), "reply: {}", reply.text);
    assert_eq!(harness.primary.calls(), 0);
}

// =============================================================================
// Journey: history, averages and changes
// =============================================================================

#[tokio::test]
async fn user_asks_for_the_weekly_average() {
    let harness = keyword_harness(week_of_closes(), week_of_closes());

    let reply = harness
        .dispatcher
        .handle_turn("c1", "average price of TSLA over the last week")
        .await;

    // (100 + 110 + 120 + 130 + 182.5) / 5
    assert!(reply.text.contains("128.50"), "reply: {}", reply.text);
    assert!(reply.text.contains("5 trading day(s)"), "reply: {}", reply.text);
}

#[tokio::test]
async fn weekend_start_date_is_shifted_and_disclosed() {
    // Given: No session on Sunday 2024-03-03
    let closes = vec![
        (date!(2024 - 02 - 29), Some(790.0)),
        (date!(2024 - 03 - 01), Some(800.0)),
        (date!(2024 - 03 - 04), Some(850.0)),
        (date!(2024 - 03 - 08), Some(880.0)),
    ];
    let harness = keyword_harness(Behavior::Closes(closes.clone()), Behavior::Closes(closes));

    // When: The change since that Sunday is requested
    let reply = harness
        .dispatcher
        .handle_turn("c1", "How did NVDA change from 2024-03-03 to 2024-03-08?")
        .await;

    // Then: Friday's close is used and the shift is reported
    assert!(reply.text.contains("+10.00%"), "reply: {}", reply.text);
    assert!(reply.text.contains("2024-03-01"), "reply: {}", reply.text);
    assert!(reply.text.contains("No trading data on 2024-03-03"), "reply: {}", reply.text);
}

#[tokio::test]
async fn tighter_lookback_refuses_to_bridge_a_long_weekend() {
    // Given: Executor allowing only one day of lookback
    let closes = Behavior::Closes(vec![
        (date!(2024 - 03 - 01), Some(800.0)),
        (date!(2024 - 03 - 08), Some(880.0)),
    ]);
    let coordinator = RetrievalCoordinator::new(
        FakeProvider::new(ProviderId::Yahoo, closes.clone()),
        FakeProvider::new(ProviderId::Alphavantage, closes),
    );
    let executor = ToolExecutor::new(coordinator)
        .with_today(date!(2024 - 03 - 08))
        .with_tolerance(LookbackTolerance { max_lookback_days: 1 });
    let dispatcher = Dispatcher::new(Arc::new(KeywordInterpreter::new()), executor);

    // When: The change since Sunday is requested
    let reply = dispatcher
        .handle_turn("c1", "How did NVDA change from 2024-03-03 to 2024-03-08?")
        .await;

    // Then: Friday is out of reach and the answer is insufficient data
    assert_eq!(failure_kind(&reply), Some(FailureKind::InsufficientData));
}

#[tokio::test]
async fn user_asks_for_recent_history() {
    let harness = keyword_harness(week_of_closes(), week_of_closes());

    let reply = harness
        .dispatcher
        .handle_turn("c1", "show me the history of GOOGL over the past 5 days")
        .await;

    assert_eq!(
        reply.tool_call.as_ref().map(|call| call.arguments["period"].clone()),
        Some(json!("5d"))
    );
    // 182.5 over 100.0 is +82.50%
    assert!(reply.text.contains("+82.50%"), "reply: {}", reply.text);
    assert!(reply.text.contains("previous close 130.00"), "reply: {}", reply.text);
}

// =============================================================================
// Journey: web search
// =============================================================================

#[tokio::test]
async fn web_search_is_offered_only_with_a_backend() {
    let search: Arc<dyn WebSearch> =
        Arc::new(CannedSearch(Ok(String::from("Rates were left unchanged."))));
    let harness = harness_with(
        FakeProvider::new(ProviderId::Yahoo, week_of_closes()),
        FakeProvider::new(ProviderId::Alphavantage, week_of_closes()),
        Arc::new(KeywordInterpreter::new()),
        Some(search),
    );
    assert!(harness.dispatcher.registry().get("web_search").is_some());

    let reply = harness
        .dispatcher
        .handle_turn("c1", "latest news about the fed")
        .await;

    assert_eq!(reply.text, "Rates were left unchanged.");
}

#[tokio::test]
async fn failing_search_backend_is_reported_as_unavailable() {
    let search: Arc<dyn WebSearch> = Arc::new(CannedSearch(Err(SearchError::new("timeout"))));
    let harness = harness_with(
        FakeProvider::new(ProviderId::Yahoo, week_of_closes()),
        FakeProvider::new(ProviderId::Alphavantage, week_of_closes()),
        Arc::new(KeywordInterpreter::new()),
        Some(search),
    );

    let reply = harness
        .dispatcher
        .handle_turn("c1", "search for fed headlines")
        .await;

    assert_eq!(failure_kind(&reply), Some(FailureKind::SearchUnavailable));
}

// =============================================================================
// Journey: concurrency and cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn turns_of_one_conversation_never_overlap() {
    // Given: An interpreter that records overlapping calls
    let overlap = Arc::new(Overlap::default());
    let harness = harness_with(
        FakeProvider::new(ProviderId::Yahoo, week_of_closes()),
        FakeProvider::new(ProviderId::Alphavantage, week_of_closes()),
        overlap.clone(),
        None,
    );

    // When: Two turns of the same conversation arrive together
    tokio::join!(
        harness.dispatcher.handle_turn("same", "first"),
        harness.dispatcher.handle_turn("same", "second"),
    );

    // Then: They ran one after the other
    assert_eq!(overlap.peak.load(Ordering::SeqCst), 1);

    // And: Different conversations do run concurrently
    tokio::join!(
        harness.dispatcher.handle_turn("left", "first"),
        harness.dispatcher.handle_turn("right", "second"),
    );
    assert_eq!(overlap.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn closing_a_session_cancels_the_in_flight_fetch() {
    // Given: A primary provider that never answers
    let harness = keyword_harness(Behavior::Hang, week_of_closes());
    let session = harness.dispatcher.open_session("c1");
    let closer = session.closer();

    // When: The session is closed while the price lookup is pending
    let (outcome, ()) = tokio::join!(session.handle_turn("price of AAPL"), async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        closer.close();
    });

    // Then: The turn is cancelled and later turns are refused
    assert!(matches!(outcome, Err(TurnError::Cancelled { .. })));
    assert_eq!(harness.secondary.calls(), 0);
    assert_eq!(harness.dispatcher.open_gates(), 0);
    let later = session.handle_turn("What's 15% of 250?").await;
    assert!(matches!(later, Err(TurnError::Cancelled { .. })));
}

#[tokio::test(start_paused = true)]
async fn conversations_leave_no_state_behind_once_their_turns_end() {
    // Given: A dispatcher serving many short-lived conversations
    let overlap = Arc::new(Overlap::default());
    let harness = harness_with(
        FakeProvider::new(ProviderId::Yahoo, week_of_closes()),
        FakeProvider::new(ProviderId::Alphavantage, week_of_closes()),
        overlap,
        None,
    );

    // When: Each conversation runs one turn, and one conversation queues two turns at once
    for id in 0..25 {
        harness
            .dispatcher
            .handle_turn(&format!("visitor-{id}"), "hello")
            .await;
    }
    tokio::join!(
        harness.dispatcher.handle_turn("queued", "first"),
        harness.dispatcher.handle_turn("queued", "second"),
    );

    // Then: Every per-conversation gate has been dropped
    assert_eq!(harness.dispatcher.open_gates(), 0);
}
