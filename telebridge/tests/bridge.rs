// Copyright 2025 The Telebridge Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bridge loop behaviour against scripted in-memory upstream and sink.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;

use telebridge::{Bridge, BridgeOptions, ConnectionState, Stats};
use telebridge_sink::{Destination, FieldMap, FieldValue, PublishError, Publisher, Router, Routing};
use telebridge_source_amqp::{RawMessage, Session, SourceError, Upstream};

enum Step {
    Deliver(u64, Vec<u8>),
    Drop,
}

#[derive(Default)]
struct Record {
    connects: usize,
    subscribes: usize,
    closes: usize,
    acked: Vec<u64>,
    fail_ack_once: Vec<u64>,
    fail_subscribes: usize,
}

struct FakeUpstream {
    failures: usize,
    sessions: VecDeque<Vec<Step>>,
    record: Arc<Mutex<Record>>,
    stop: Arc<watch::Sender<bool>>,
}

struct FakeSession {
    steps: VecDeque<Step>,
    record: Arc<Mutex<Record>>,
    stop: Arc<watch::Sender<bool>>,
}

#[async_trait]
impl Upstream for FakeUpstream {
    type Session = FakeSession;

    async fn connect(&mut self) -> Result<FakeSession, SourceError> {
        self.record.lock().unwrap().connects += 1;
        if self.failures > 0 {
            self.failures -= 1;
            return Err(SourceError::Other("connection refused".into()));
        }
        let steps = self.sessions.pop_front().unwrap_or_default();
        Ok(FakeSession {
            steps: steps.into(),
            record: self.record.clone(),
            stop: self.stop.clone(),
        })
    }

    fn endpoint(&self) -> String {
        "fake://upstream".to_string()
    }
}

#[async_trait]
impl Session for FakeSession {
    type Handle = u64;

    async fn subscribe(&mut self) -> Result<(), SourceError> {
        let mut record = self.record.lock().unwrap();
        if record.fail_subscribes > 0 {
            record.fail_subscribes -= 1;
            return Err(SourceError::Other("ACCESS_REFUSED - queue in exclusive use".into()));
        }
        record.subscribes += 1;
        Ok(())
    }

    async fn recv(&mut self) -> Result<RawMessage<u64>, SourceError> {
        match self.steps.pop_front() {
            Some(Step::Deliver(id, payload)) => Ok(RawMessage {
                payload,
                handle: id,
                redelivered: false,
            }),
            Some(Step::Drop) => Err(SourceError::Other("connection reset by peer".into())),
            None => {
                // Script finished: ask the bridge to stop and block like an idle queue.
                self.stop.send_replace(true);
                std::future::pending().await
            }
        }
    }

    async fn ack(&mut self, handle: u64) -> Result<(), SourceError> {
        let mut record = self.record.lock().unwrap();
        if let Some(pos) = record.fail_ack_once.iter().position(|id| *id == handle) {
            record.fail_ack_once.remove(pos);
            return Err(SourceError::Other("channel closed".into()));
        }
        record.acked.push(handle);
        Ok(())
    }

    async fn close(self) -> Result<(), SourceError> {
        self.record.lock().unwrap().closes += 1;
        Ok(())
    }
}

type Published = Arc<Mutex<Vec<(Destination, FieldMap)>>>;

struct FakePublisher {
    outcomes: VecDeque<bool>,
    published: Published,
    shutdowns: Arc<Mutex<usize>>,
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(
        &mut self,
        destination: &Destination,
        fields: &FieldMap,
    ) -> Result<(), PublishError> {
        self.published
            .lock()
            .unwrap()
            .push((destination.clone(), fields.clone()));
        if self.outcomes.pop_front().unwrap_or(true) {
            Ok(())
        } else {
            Err(PublishError::Status {
                url: "http://daq.test/api/gps/data".into(),
                status: 503,
            })
        }
    }

    async fn shutdown(&mut self) {
        *self.shutdowns.lock().unwrap() += 1;
    }
}

struct Scenario {
    failures: usize,
    sessions: Vec<Vec<Step>>,
    outcomes: Vec<bool>,
    fail_ack_once: Vec<u64>,
    fail_subscribes: usize,
    routing: Routing,
}

impl Scenario {
    fn new(sessions: Vec<Vec<Step>>) -> Self {
        Self {
            failures: 0,
            sessions,
            outcomes: Vec::new(),
            fail_ack_once: Vec::new(),
            fail_subscribes: 0,
            routing: Routing::Channels(Router::default()),
        }
    }
}

struct Outcome {
    stats: Stats,
    state: ConnectionState,
    record: Arc<Mutex<Record>>,
    published: Published,
    shutdowns: usize,
}

impl Outcome {
    fn acked(&self) -> Vec<u64> {
        self.record.lock().unwrap().acked.clone()
    }

    fn published(&self) -> Vec<(Destination, FieldMap)> {
        self.published.lock().unwrap().clone()
    }
}

fn stopper() -> (Arc<watch::Sender<bool>>, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (Arc::new(tx), rx)
}

async fn run(scenario: Scenario) -> Outcome {
    let (stop, shutdown) = stopper();
    run_with(scenario, stop, shutdown).await
}

async fn run_with(
    scenario: Scenario,
    stop: Arc<watch::Sender<bool>>,
    shutdown: watch::Receiver<bool>,
) -> Outcome {
    let record = Arc::new(Mutex::new(Record {
        fail_ack_once: scenario.fail_ack_once,
        fail_subscribes: scenario.fail_subscribes,
        ..Record::default()
    }));
    let published: Published = Arc::default();
    let shutdowns = Arc::new(Mutex::new(0));

    let upstream = FakeUpstream {
        failures: scenario.failures,
        sessions: scenario.sessions.into(),
        record: record.clone(),
        stop,
    };
    let publisher = FakePublisher {
        outcomes: scenario.outcomes.into(),
        published: published.clone(),
        shutdowns: shutdowns.clone(),
    };

    let mut bridge = Bridge::new(BridgeOptions::default(), upstream, scenario.routing, publisher);
    let stats = bridge.run(shutdown).await;
    assert_eq!(&stats, bridge.stats());

    let shutdowns = *shutdowns.lock().unwrap();
    Outcome {
        stats,
        state: bridge.state(),
        record,
        published,
        shutdowns,
    }
}

fn gps(latitude: f64) -> Vec<u8> {
    json!({"latitude": latitude, "timestamp": "2024-01-01T00:00:00Z"})
        .to_string()
        .into_bytes()
}

fn http(channel: &str) -> Destination {
    Destination::Http {
        channel: channel.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_delivers_and_acks_in_receipt_order() {
    let outcome = run(Scenario::new(vec![vec![
        Step::Deliver(1, gps(48.1)),
        Step::Deliver(2, br#"{"battery_volt": "12.6"}"#.to_vec()),
        Step::Deliver(3, br#"{"humidity": 55}"#.to_vec()),
    ]]))
    .await;

    assert_eq!(outcome.acked(), vec![1, 2, 3]);
    let destinations: Vec<_> = outcome.published().into_iter().map(|(d, _)| d).collect();
    assert_eq!(destinations, vec![http("gps"), http("epsolar"), http("environment")]);
    assert_eq!(outcome.stats.received, 3);
    assert_eq!(outcome.stats.acked, 3);
    assert_eq!(outcome.stats.bounces, 0);
    assert_eq!(outcome.state, ConnectionState::Disconnected);
    assert_eq!(outcome.shutdowns, 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_json_is_acked_once_and_consumption_continues() {
    let outcome = run(Scenario::new(vec![vec![
        Step::Deliver(1, b"{\"latitude\": 1.0".to_vec()),
        Step::Deliver(2, gps(1.0)),
    ]]))
    .await;

    assert_eq!(outcome.acked(), vec![1, 2]);
    assert_eq!(outcome.published().len(), 1);
    assert_eq!(outcome.stats.dropped, 1);
    assert_eq!(outcome.stats.failed, 0);
    assert_eq!(outcome.stats.bounces, 0);
}

#[tokio::test(start_paused = true)]
async fn test_non_object_payload_is_dropped() {
    let outcome = run(Scenario::new(vec![vec![Step::Deliver(7, b"[1, 2, 3]".to_vec())]])).await;

    assert_eq!(outcome.acked(), vec![7]);
    assert!(outcome.published().is_empty());
    assert_eq!(outcome.stats.dropped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_publish_error_leaves_message_unacked() {
    let mut scenario = Scenario::new(vec![vec![
        Step::Deliver(1, gps(1.0)),
        Step::Deliver(2, gps(2.0)),
    ]]);
    scenario.outcomes = vec![false, true];

    let outcome = run(scenario).await;

    assert_eq!(outcome.acked(), vec![2]);
    assert_eq!(outcome.published().len(), 2);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.acked, 1);
    assert_eq!(outcome.stats.bounces, 0);
}

#[tokio::test(start_paused = true)]
async fn test_unroutable_message_is_left_for_redelivery() {
    let outcome = run(Scenario::new(vec![vec![
        Step::Deliver(1, br#"{"foo": 1}"#.to_vec()),
        Step::Deliver(2, br#"{"humidity": 40}"#.to_vec()),
    ]]))
    .await;

    assert_eq!(outcome.acked(), vec![2]);
    assert_eq!(outcome.published().len(), 1);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.dropped, 0);
}

#[tokio::test(start_paused = true)]
async fn test_redelivered_message_is_published_again() {
    let mut scenario = Scenario::new(vec![vec![
        Step::Deliver(1, gps(3.5)),
        Step::Deliver(2, gps(3.5)),
    ]]);
    scenario.outcomes = vec![false, true];

    let outcome = run(scenario).await;

    let published = outcome.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0], published[1]);
    assert_eq!(outcome.acked(), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_consecutive_failures() {
    let mut scenario = Scenario::new(vec![vec![Step::Deliver(1, gps(1.0))]]);
    scenario.failures = 3;

    let outcome = run(scenario).await;

    assert_eq!(outcome.record.lock().unwrap().connects, 4);
    assert_eq!(outcome.stats.connects, 4);
    assert_eq!(outcome.stats.bounces, 3);
    assert_eq!(outcome.acked(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_connection_drop() {
    let outcome = run(Scenario::new(vec![
        vec![Step::Deliver(1, gps(1.0)), Step::Drop],
        vec![Step::Deliver(2, gps(2.0))],
    ]))
    .await;

    assert_eq!(outcome.acked(), vec![1, 2]);
    assert_eq!(outcome.stats.bounces, 1);
    assert_eq!(outcome.stats.connects, 2);
    let record = outcome.record.lock().unwrap();
    assert_eq!(record.subscribes, 2);
    assert_eq!(record.closes, 2);
}

#[tokio::test(start_paused = true)]
async fn test_ack_failure_triggers_reconnect() {
    let mut scenario = Scenario::new(vec![
        vec![Step::Deliver(1, gps(1.0))],
        vec![Step::Deliver(1, gps(1.0))],
    ]);
    scenario.fail_ack_once = vec![1];

    let outcome = run(scenario).await;

    assert_eq!(outcome.acked(), vec![1]);
    assert_eq!(outcome.published().len(), 2);
    assert_eq!(outcome.stats.bounces, 1);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_failure_triggers_reconnect() {
    let mut scenario = Scenario::new(vec![Vec::new(), vec![Step::Deliver(1, gps(1.0))]]);
    scenario.fail_subscribes = 1;

    let outcome = run(scenario).await;

    assert_eq!(outcome.stats.bounces, 1);
    assert_eq!(outcome.stats.connects, 2);
    assert_eq!(outcome.acked(), vec![1]);
    let record = outcome.record.lock().unwrap();
    assert_eq!(record.subscribes, 1);
    assert_eq!(record.closes, 2);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_routing_sanitizes_and_passes_through() {
    let mut scenario = Scenario::new(vec![vec![Step::Deliver(
        1,
        br#"{"foo": "1.5", "bad": "nan", "timestamp": 1700000000}"#.to_vec(),
    )]]);
    let topic = Destination::Mqtt {
        topic: "solarbox/telemetry".into(),
        qos: 1,
    };
    scenario.routing = Routing::Fixed(topic.clone());

    let outcome = run(scenario).await;

    let published = outcome.published();
    assert_eq!(published.len(), 1);
    let (destination, fields) = &published[0];
    assert_eq!(destination, &topic);
    assert_eq!(fields.get("foo"), Some(&FieldValue::Number(1.5)));
    assert_eq!(fields.get("timestamp"), Some(&FieldValue::Verbatim(json!(1700000000))));
    assert!(!fields.contains_key("bad"));
    assert_eq!(outcome.stats.fields_dropped, 1);
    assert_eq!(outcome.acked(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_bare_nan_tokens_drop_only_the_field() {
    let outcome = run(Scenario::new(vec![vec![Step::Deliver(
        1,
        br#"{"latitude": NaN, "humidity": 40}"#.to_vec(),
    )]]))
    .await;

    let published = outcome.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, http("environment"));
    assert!(!published[0].1.contains_key("latitude"));
    assert_eq!(outcome.acked(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_backoff() {
    let mut scenario = Scenario::new(Vec::new());
    scenario.failures = usize::MAX;

    let (stop, shutdown) = stopper();
    let trigger = stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1_250)).await;
        trigger.send_replace(true);
    });

    let outcome = run_with(scenario, stop, shutdown).await;

    // Attempts at t=0, 500ms and 1000ms; the third backoff is cut short.
    assert_eq!(outcome.stats.connects, 3);
    assert_eq!(outcome.stats.bounces, 3);
    assert_eq!(outcome.state, ConnectionState::Disconnected);
    assert_eq!(outcome.shutdowns, 1);
}
