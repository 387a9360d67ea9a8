/// Alert dispatcher: the core half of the scan callback.
///
/// Runs once per observed advertisement. Work is bounded by the registry
/// size plus at most one broadcast attempt; nothing here waits on the
/// control loop.
use crate::classifier::{classify, Classification};
use crate::comm::{publish, NodeEvent};
use crate::node::NodeContext;
use crate::presentation::{Alert, HitSource};
use crate::protocol::{MeshMessage, Payload, Position};
use crate::radio::MeshRadio;
use crate::scanner::DetectionEvent;

/// Classify one detection and act on it: count it, raise the alert, tell
/// the mesh and the base station.
pub fn handle_detection<'c, R: MeshRadio>(
    ctx: &'c NodeContext<R>,
    event: &DetectionEvent,
) -> Classification<'c> {
    ctx.counters.record_scan();
    if ctx.config.show_all_devices {
        log::info!(
            "BLE {} rssi={} name={}",
            event.identifier,
            event.rssi,
            event.name.as_deref().unwrap_or("-")
        );
    }

    let class = classify(&ctx.registry, &event.identifier);
    let now = event.timestamp_ms;
    let rssi = i16::from(event.rssi);
    let position: Option<Position> = event.position.or_else(|| ctx.latest_fix()).map(Into::into);

    match class {
        Classification::Exact => {
            ctx.counters.record_true_hit();
            log::info!("TRUE HIT: {} rssi={}", event.identifier, rssi);
            ctx.presentation.request(
                Alert::TrueHit {
                    identifier: event.identifier.clone(),
                    rssi,
                    source: HitSource::Local { at_ms: now },
                },
                now,
            );
            broadcast(
                ctx,
                Payload::TrueHit {
                    identifier: event.identifier.clone(),
                    rssi,
                },
                position,
                now,
            );
            publish(
                &ctx.reports,
                &NodeEvent::TrueHit {
                    id: &event.identifier,
                    rssi,
                    lat: position.map(|p| p.lat),
                    lon: position.map(|p| p.lon),
                    ts: now,
                },
            );
        }
        Classification::Prefix(sig) => {
            ctx.counters.record_possible_hit();
            log::info!(
                "POSSIBLE HIT: {} ({} / {}) rssi={}",
                event.identifier,
                sig.label,
                sig.source,
                rssi
            );
            if !ctx.presentation.request(
                Alert::PossibleHit {
                    identifier: event.identifier.clone(),
                    rssi,
                    label: sig.label.clone(),
                },
                now,
            ) {
                log::debug!("Possible hit not shown: true hit holds the screen");
            }
            broadcast(
                ctx,
                Payload::PossibleHit {
                    identifier: event.identifier.clone(),
                    rssi,
                    label: sig.label.clone(),
                },
                position,
                now,
            );
            publish(
                &ctx.reports,
                &NodeEvent::PossibleHit {
                    id: &event.identifier,
                    rssi,
                    device: &sig.label,
                    manufacturer: &sig.source,
                    lat: position.map(|p| p.lat),
                    lon: position.map(|p| p.lon),
                    ts: now,
                },
            );
        }
        Classification::None => {}
    }
    class
}

/// Best-effort single broadcast. Failures are counted and logged, never
/// retried.
pub(crate) fn broadcast<R: MeshRadio>(
    ctx: &NodeContext<R>,
    payload: Payload,
    position: Option<Position>,
    now: u32,
) -> bool {
    let msg = MeshMessage {
        node_id: ctx.config.node_id.clone(),
        position,
        timestamp: now,
        payload,
    };
    match ctx.radio.broadcast(&msg) {
        Ok(()) => {
            ctx.counters.record_send(true);
            log::debug!("Mesh TX {}", msg.payload.kind());
            true
        }
        Err(e) => {
            ctx.counters.record_send(false);
            log::warn!("Mesh TX {} failed: {}", msg.payload.kind(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon::Fix;
    use crate::config::NodeConfig;
    use crate::presentation::PresentationState;
    use crate::protocol::{decode, Identifier};
    use crate::radio::testing::LoopbackRadio;
    use crate::radio::SharedRadio;
    use crate::registry::{PrefixSignature, Registry};

    fn context(radio: SharedRadio<LoopbackRadio>) -> NodeContext<LoopbackRadio> {
        let registry = Registry::load(
            ["aa:bb:cc:dd:ee:ff"],
            [PrefixSignature::new("70:b3:d5:b3:4", "Pacemaker", "Medtronic").unwrap()],
        );
        NodeContext::new(NodeConfig::from_defaults(), registry, radio)
    }

    fn event(id: &str, rssi: i8, ts: u32) -> DetectionEvent {
        DetectionEvent::new(Identifier::try_from(id).unwrap(), rssi, None, ts, None)
    }

    fn sent(ctx: &NodeContext<LoopbackRadio>) -> std::vec::Vec<MeshMessage> {
        ctx.radio
            .with(|r| r.sent.iter().map(|f| decode(f).unwrap()).collect())
            .unwrap()
    }

    #[test]
    fn exact_match_raises_true_hit() {
        let ctx = context(SharedRadio::new(LoopbackRadio::default()));
        let class = handle_detection(&ctx, &event("AA:BB:CC:DD:EE:FF", -60, 1000));
        assert_eq!(class, Classification::Exact);

        let stats = ctx.counters.snapshot();
        assert_eq!(stats.scans, 1);
        assert_eq!(stats.true_hits, 1);
        assert_eq!(stats.mesh_tx, 1);
        assert_eq!(
            ctx.presentation.state(),
            PresentationState::Locked { expiry: 4000 }
        );

        let msgs = sent(&ctx);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].node_id.as_str(), "NODE-001");
        assert_eq!(msgs[0].timestamp, 1000);
        assert_eq!(
            msgs[0].payload,
            Payload::TrueHit {
                identifier: Identifier::try_from("AA:BB:CC:DD:EE:FF").unwrap(),
                rssi: -60,
            }
        );
        assert!(ctx.reports.try_receive().is_ok());
    }

    #[test]
    fn prefix_match_raises_possible_hit() {
        let ctx = context(SharedRadio::new(LoopbackRadio::default()));
        let class = handle_detection(&ctx, &event("70:b3:d5:b3:42:00", -80, 500));
        assert!(matches!(class, Classification::Prefix(sig) if sig.label == "Pacemaker"));

        let stats = ctx.counters.snapshot();
        assert_eq!(stats.possible_hits, 1);
        assert_eq!(stats.true_hits, 0);
        assert_eq!(
            ctx.presentation.state(),
            PresentationState::Locked { expiry: 2500 }
        );
        match &sent(&ctx)[0].payload {
            Payload::PossibleHit { label, rssi, .. } => {
                assert_eq!(label.as_str(), "Pacemaker");
                assert_eq!(*rssi, -80);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn unknown_device_is_only_counted() {
        let ctx = context(SharedRadio::new(LoopbackRadio::default()));
        let class = handle_detection(&ctx, &event("00:11:22:33:44:55", -40, 10));
        assert_eq!(class, Classification::None);
        assert_eq!(ctx.counters.snapshot().scans, 1);
        assert_eq!(ctx.presentation.state(), PresentationState::Scanning);
        assert!(sent(&ctx).is_empty());
        assert!(ctx.reports.try_receive().is_err());
    }

    #[test]
    fn send_failure_does_not_stop_the_alert() {
        let ctx = context(SharedRadio::new(LoopbackRadio {
            fail_sends: true,
            ..Default::default()
        }));
        handle_detection(&ctx, &event("aa:bb:cc:dd:ee:ff", -60, 0));
        handle_detection(&ctx, &event("aa:bb:cc:dd:ee:ff", -61, 100));

        let stats = ctx.counters.snapshot();
        assert_eq!(stats.true_hits, 2);
        assert_eq!(stats.mesh_tx, 0);
        assert_eq!(stats.mesh_tx_failed, 2);
        assert!(matches!(
            ctx.presentation.state(),
            PresentationState::Locked { .. }
        ));
    }

    #[test]
    fn missing_radio_degrades_to_local_alert() {
        let ctx = context(SharedRadio::unavailable());
        handle_detection(&ctx, &event("aa:bb:cc:dd:ee:ff", -60, 0));
        let stats = ctx.counters.snapshot();
        assert_eq!(stats.true_hits, 1);
        assert_eq!(stats.mesh_tx_failed, 1);
    }

    #[test]
    fn frames_carry_the_latest_fix() {
        let ctx = context(SharedRadio::new(LoopbackRadio::default()));
        ctx.record_fix(Some(Fix::new(44.5, -123.25)));
        handle_detection(&ctx, &event("aa:bb:cc:dd:ee:ff", -60, 0));
        assert_eq!(
            sent(&ctx)[0].position,
            Some(Position {
                lat: 44.5,
                lon: -123.25
            })
        );
    }
}
