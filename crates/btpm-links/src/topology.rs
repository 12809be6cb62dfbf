//! Static description of the monitored networks and directed connections.
//!
//! Loaded once at startup and immutable afterwards. Connection order is the
//! declaration order and drives the deterministic processing order of every
//! poll cycle.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Node / Connection
// ---------------------------------------------------------------------------

/// One network taking part in the relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Stable identity (e.g. `"0x1.icon"`); used as the storage and query key.
    pub id: String,
    /// Display label.
    pub name: String,
    /// RPC endpoint of a node of this network.
    pub endpoint: String,
    /// Address of the BTP message center contract on this network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            endpoint: endpoint.into(),
            bmc: None,
        }
    }

    pub fn with_bmc(mut self, bmc: impl Into<String>) -> Self {
        self.bmc = Some(bmc.into());
        self
    }

    /// BTP address of this network's message center (`btp://<id>/<bmc>`).
    pub fn btp_address(&self) -> Option<String> {
        self.bmc.as_ref().map(|bmc| format!("btp://{}/{}", self.id, bmc))
    }
}

/// One direction of a relay link. `(a, b)` and `(b, a)` are distinct
/// connections that are paired only for display.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub src: String,
    pub dst: String,
}

impl Connection {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }

    /// Stable snapshot-store key.
    pub fn key(&self) -> String {
        format!("{}->{}", self.src, self.dst)
    }

    pub fn reverse(&self) -> Connection {
        Connection {
            src: self.dst.clone(),
            dst: self.src.clone(),
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopologyError {
    EmptyNodeId,
    DuplicateNode(String),
    UnknownNode { conn: Connection, id: String },
    SelfConnection(String),
    DuplicateConnection(Connection),
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyError::EmptyNodeId => write!(f, "network with empty id"),
            TopologyError::DuplicateNode(id) => write!(f, "duplicate network id: {id}"),
            TopologyError::UnknownNode { conn, id } => {
                write!(f, "link {conn} references unknown network {id}")
            }
            TopologyError::SelfConnection(id) => write!(f, "link from {id} to itself"),
            TopologyError::DuplicateConnection(conn) => write!(f, "duplicate link {conn}"),
        }
    }
}

impl std::error::Error for TopologyError {}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// Serialized form of a topology (networks JSON / YAML section).
///
/// When `links` is absent every ordered pair of networks is monitored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDoc {
    pub networks: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<Connection>>,
}

/// Validated, immutable topology.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TopologyDoc", into = "TopologyDoc")]
pub struct Topology {
    nodes: Vec<Node>,
    index: BTreeMap<String, usize>,
    connections: Vec<Connection>,
}

impl Topology {
    pub fn new(nodes: Vec<Node>, connections: Vec<Connection>) -> Result<Self, TopologyError> {
        let mut index = BTreeMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if node.id.is_empty() {
                return Err(TopologyError::EmptyNodeId);
            }
            if index.insert(node.id.clone(), i).is_some() {
                return Err(TopologyError::DuplicateNode(node.id.clone()));
            }
        }

        let mut seen = BTreeSet::new();
        for conn in &connections {
            for id in [&conn.src, &conn.dst] {
                if !index.contains_key(id) {
                    return Err(TopologyError::UnknownNode {
                        conn: conn.clone(),
                        id: id.clone(),
                    });
                }
            }
            if conn.src == conn.dst {
                return Err(TopologyError::SelfConnection(conn.src.clone()));
            }
            if !seen.insert(conn.clone()) {
                return Err(TopologyError::DuplicateConnection(conn.clone()));
            }
        }

        Ok(Self {
            nodes,
            index,
            connections,
        })
    }

    /// Every ordered pair of distinct networks, in declaration order.
    pub fn full_mesh(nodes: Vec<Node>) -> Result<Self, TopologyError> {
        let mut connections = Vec::new();
        for a in &nodes {
            for b in &nodes {
                if a.id != b.id {
                    connections.push(Connection::new(a.id.clone(), b.id.clone()));
                }
            }
        }
        Self::new(nodes, connections)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Connections in declaration order.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, conn: &Connection) -> bool {
        self.connections.contains(conn)
    }

    /// Display name of a network, or the raw id when it is not configured.
    pub fn name_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.node(id).map(|n| n.name.as_str()).unwrap_or(id)
    }
}

impl TryFrom<TopologyDoc> for Topology {
    type Error = TopologyError;

    fn try_from(doc: TopologyDoc) -> Result<Self, Self::Error> {
        match doc.links {
            Some(links) => Topology::new(doc.networks, links),
            None => Topology::full_mesh(doc.networks),
        }
    }
}

impl From<Topology> for TopologyDoc {
    fn from(t: Topology) -> Self {
        TopologyDoc {
            networks: t.nodes,
            links: Some(t.connections),
        }
    }
}
