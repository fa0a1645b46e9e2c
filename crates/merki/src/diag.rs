//! Diagnostics sender — ships decal engine metrics to `merki-telemetry`
//! over UDP.
//!
//! Enabled by the `diagnostics` feature flag. The engine counts work in a
//! [`DecalStats`] as it happens; once per frame the host packs a
//! [`DecalSnapshot`] (see [`DecalStore::snapshot`]) and hands it to a
//! [`DiagSender`], which serializes it as JSON and fires it at
//! `127.0.0.1:9870` (throttled to 10 Hz internally).
//!
//! [`DecalStore::snapshot`]: crate::decal::DecalStore::snapshot

use std::net::UdpSocket;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::decal::RetireCause;

// ── Counters ─────────────────────────────────────────────────────────────

/// Monotonic engine counters. Retirement is split by cause so a budget
/// that's constantly churning decals shows up as the culprit it is.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecalStats {
    pub decals_added: u64,
    pub retired_vertex_budget: u64,
    pub retired_global_count: u64,
    pub retired_model_count: u64,
    pub retired_index_ceiling: u64,
    pub triangles_tested: u64,
    pub triangles_clipped: u64,
    pub triangles_emitted: u64,
    pub draw_calls: u64,
    pub draw_vertices: u64,
}

impl DecalStats {
    pub(crate) fn count_retire(&mut self, cause: RetireCause) {
        match cause {
            RetireCause::VertexBudget => self.retired_vertex_budget += 1,
            RetireCause::GlobalCount => self.retired_global_count += 1,
            RetireCause::ModelCount => self.retired_model_count += 1,
            RetireCause::IndexCeiling => self.retired_index_ceiling += 1,
        }
    }

    /// Decals retired for any cause.
    pub fn retired_total(&self) -> u64 {
        self.retired_vertex_budget
            + self.retired_global_count
            + self.retired_model_count
            + self.retired_index_ceiling
    }
}

// ── Snapshot (wire format) ───────────────────────────────────────────────

/// Point-in-time state of a [`DecalStore`](crate::decal::DecalStore),
/// serialized as the telemetry wire format.
#[derive(Debug, Clone, Serialize)]
pub struct DecalSnapshot {
    pub frame: u64,
    pub list_count: usize,
    pub decal_count: usize,
    pub pooled_vertex_bytes: usize,
    pub vertex_budget_bytes: usize,
    pub max_decals_per_model: usize,
    pub stats: DecalStats,
}

// ── DiagSender ───────────────────────────────────────────────────────────

/// Owns the outbound UDP socket and throttling state.
pub struct DiagSender {
    socket: UdpSocket,
    last_send: Instant,
}

impl DiagSender {
    /// Create a new sender on an ephemeral port, aimed at the telemetry
    /// TUI. `None` when no socket could be opened.
    pub fn new() -> Option<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").ok()?;
        socket.connect("127.0.0.1:9870").ok()?;
        socket.set_nonblocking(true).ok()?;
        Some(Self {
            socket,
            // Send immediately on the first frame.
            last_send: Instant::now() - Duration::from_secs(1),
        })
    }

    /// Serialize and send a snapshot, throttled to 10 Hz. Send errors are
    /// ignored; telemetry is fire-and-forget.
    pub fn send(&mut self, snapshot: &DecalSnapshot) {
        let now = Instant::now();
        if now.duration_since(self.last_send).as_millis() < 100 {
            return;
        }
        self.last_send = now;
        if let Ok(json) = serde_json::to_vec(snapshot) {
            let _ = self.socket.send(&json);
        }
    }
}
