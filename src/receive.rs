/// Mesh receive handler.
///
/// Polls the radio once per loop tick. A true hit from another node takes
/// over the screen the same way a local one does; everything else is logged
/// and reported. Nothing is re-broadcast: the mesh is single-hop.
use crate::comm::{publish, NodeEvent};
use crate::node::NodeContext;
use crate::presentation::{Alert, HitSource};
use crate::protocol::{decode, MeshMessage, Payload};
use crate::radio::MeshRadio;

/// Poll for one inbound frame and act on it. Returns the decoded message,
/// if one arrived and decoded.
pub fn poll_mesh<R: MeshRadio>(
    ctx: &NodeContext<R>,
    buf: &mut [u8],
    now_ms: u32,
) -> Option<MeshMessage> {
    let len = match ctx.radio.try_receive(buf) {
        Ok(Some(len)) => len,
        Ok(None) => return None,
        Err(e) => {
            log::warn!("Mesh RX failed: {}", e);
            return None;
        }
    };
    ctx.counters.record_mesh_rx();

    let msg = match decode(&buf[..len]) {
        Ok(msg) => msg,
        Err(e) => {
            ctx.counters.record_mesh_dropped();
            log::debug!("Mesh RX dropped: {}", e);
            return None;
        }
    };
    handle_message(ctx, &msg, now_ms);
    Some(msg)
}

fn handle_message<R: MeshRadio>(ctx: &NodeContext<R>, msg: &MeshMessage, now_ms: u32) {
    log::info!(
        "Mesh RX {} from {} (t={})",
        msg.payload.kind(),
        msg.node_id,
        msg.timestamp
    );

    if let Payload::TrueHit { identifier, rssi } = &msg.payload {
        ctx.presentation.request(
            Alert::TrueHit {
                identifier: identifier.clone(),
                rssi: *rssi,
                source: HitSource::Mesh {
                    node_id: msg.node_id.clone(),
                },
            },
            now_ms,
        );
    }

    let (id, rssi, device) = match &msg.payload {
        Payload::TrueHit { identifier, rssi } => (Some(identifier.as_str()), Some(*rssi), None),
        Payload::PossibleHit {
            identifier,
            rssi,
            label,
        } => (Some(identifier.as_str()), Some(*rssi), Some(label.as_str())),
        Payload::Position | Payload::Status => (None, None, None),
    };
    publish(
        &ctx.reports,
        &NodeEvent::Mesh {
            from: &msg.node_id,
            kind: msg.payload.kind(),
            id,
            rssi,
            device,
            lat: msg.position.map(|p| p.lat),
            lon: msg.position.map(|p| p.lon),
            ts: msg.timestamp,
        },
    );
}
