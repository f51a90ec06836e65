// MIT License - Copyright (c) 2026 Peter Wright
// Path table: 2x2 grid of paths with health flags

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::path::TransmissionPath;

/// Network route. Routing each network to its own adapter is left to the
/// operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Network {
    #[serde(rename = "main")]
    Main,
    #[serde(rename = "back-up")]
    Backup,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Backup => "back-up",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Main => 0,
            Self::Backup => 1,
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "main" => Ok(Self::Main),
            "back-up" | "backup" => Ok(Self::Backup),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

/// Receiver slot within a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Primary,
    Secondary,
}

impl Slot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
        }
    }
}

impl FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "secondary" => Ok(Self::Secondary),
            other => Err(format!("unknown slot: {other}")),
        }
    }
}

/// Address of one cell in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CellId {
    pub network: Network,
    pub slot: Slot,
}

impl CellId {
    pub const fn new(network: Network, slot: Slot) -> Self {
        Self { network, slot }
    }

    /// Delivery order: main before back-up, primary before secondary.
    pub const ALL: [CellId; 4] = [
        CellId::new(Network::Main, Slot::Primary),
        CellId::new(Network::Main, Slot::Secondary),
        CellId::new(Network::Backup, Slot::Primary),
        CellId::new(Network::Backup, Slot::Secondary),
    ];

    /// Cells of one network, primary first.
    pub const fn of(network: Network) -> [CellId; 2] {
        [
            CellId::new(network, Slot::Primary),
            CellId::new(network, Slot::Secondary),
        ]
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.network.as_str(), self.slot.as_str())
    }
}

#[derive(Debug, Default)]
struct PathCell {
    path: Option<Arc<TransmissionPath>>,
    healthy: bool,
}

/// Health of a configured cell as reported by [`PathTable::configured`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellHealth {
    pub cell: CellId,
    pub ok: bool,
}

/// The four transmission cells behind a single lock.
///
/// Paths are handed out as `Arc`s and used outside the lock; replacing a
/// cell while an exchange is in flight lets that exchange finish against the
/// old path.
#[derive(Debug, Default)]
pub struct PathTable {
    cells: Mutex<[[PathCell; 2]; 2]>,
}

impl PathTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a path to a cell, resetting its health.
    pub async fn set(&self, cell: CellId, path: Arc<TransmissionPath>) {
        let mut cells = self.cells.lock().await;
        let c = &mut cells[cell.network.index()][cell.slot.index()];
        c.path = Some(path);
        c.healthy = false;
    }

    /// Remove the path from a cell.
    pub async fn clear(&self, cell: CellId) {
        let mut cells = self.cells.lock().await;
        let c = &mut cells[cell.network.index()][cell.slot.index()];
        c.path = None;
        c.healthy = false;
    }

    /// The configured path and its health, or `None` for an empty cell.
    pub async fn snapshot(&self, cell: CellId) -> Option<(Arc<TransmissionPath>, bool)> {
        let cells = self.cells.lock().await;
        let c = &cells[cell.network.index()][cell.slot.index()];
        c.path.clone().map(|p| (p, c.healthy))
    }

    pub async fn path(&self, cell: CellId) -> Option<Arc<TransmissionPath>> {
        self.snapshot(cell).await.map(|(p, _)| p)
    }

    /// Set a cell's health flag and return the previous value.
    pub async fn set_health(&self, cell: CellId, healthy: bool) -> bool {
        let mut cells = self.cells.lock().await;
        let c = &mut cells[cell.network.index()][cell.slot.index()];
        std::mem::replace(&mut c.healthy, healthy)
    }

    pub async fn is_healthy(&self, cell: CellId) -> bool {
        let cells = self.cells.lock().await;
        cells[cell.network.index()][cell.slot.index()].healthy
    }

    /// Health of every configured cell, in delivery order.
    pub async fn configured(&self) -> Vec<CellHealth> {
        let cells = self.cells.lock().await;
        CellId::ALL
            .iter()
            .filter_map(|&cell| {
                let c = &cells[cell.network.index()][cell.slot.index()];
                c.path.as_ref().map(|_| CellHealth {
                    cell,
                    ok: c.healthy,
                })
            })
            .collect()
    }
}
