//! Node identity: the node arena, UUID aliasing, and the two weighted
//! evidence registries (names and addresses).
//!
//! Evidence is only ever appended. A node's resolved name is the name carried
//! by its highest-weight evidence, ties keeping the earliest; a node's
//! address is the best-scoring observed host.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::model::{Node, NodeKey};
use crate::timestamp::Timestamp;

pub const LOCAL_PLACEHOLDER: &str = "local";
const SYNTHETIC_PREFIX: &str = "synthetic:";

/// True for the canonical 8-4-4-4-12 hex form.
pub fn is_full_uuid(candidate: &str) -> bool {
    candidate.len() == 36 && uuid::Uuid::parse_str(candidate).is_ok()
}

/// The two shortened forms Galera prints: the first segment, and the first
/// segment joined to the fourth (`378c0ec7-a3db`).
pub fn short_forms(full: &str) -> Vec<String> {
    let parts: Vec<&str> = full.split('-').collect();
    if parts.len() != 5 {
        return Vec::new();
    }
    vec![parts[0].to_string(), format!("{}-{}", parts[0], parts[3])]
}

fn placeholder_name(uuid: &str) -> String {
    let head = uuid.split('-').next().unwrap_or(uuid);
    format!("node-{head}")
}

/// Arena of nodes with uuid and alias indexes.
#[derive(Debug, Default)]
pub struct NodeTable {
    nodes: Vec<Node>,
    by_uuid: BTreeMap<String, NodeKey>,
    aliases: BTreeMap<String, String>,
    /// Superseded UUIDs (restarts), still resolvable.
    retired: BTreeMap<String, NodeKey>,
    by_synthetic_name: BTreeMap<String, NodeKey>,
    local: Option<NodeKey>,
}

impl NodeTable {
    pub fn get(&self, key: NodeKey) -> &Node {
        &self.nodes[self.canonical(key).0]
    }

    pub fn get_mut(&mut self, key: NodeKey) -> &mut Node {
        let key = self.canonical(key);
        &mut self.nodes[key.0]
    }

    /// Follow merge links to the surviving node.
    pub fn canonical(&self, mut key: NodeKey) -> NodeKey {
        while let Some(next) = self.nodes[key.0].merged_into {
            key = next;
        }
        key
    }

    /// Surviving nodes, in creation order.
    pub fn live(&self) -> impl Iterator<Item = (NodeKey, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.merged_into.is_none())
            .map(|(i, n)| (NodeKey(i), n))
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    pub fn local(&self) -> Option<NodeKey> {
        self.local.map(|k| self.canonical(k))
    }

    fn push(&mut self, node: Node) -> NodeKey {
        let key = NodeKey(self.nodes.len());
        self.nodes.push(node);
        key
    }

    /// Resolve any printed UUID form without creating a node.
    pub fn lookup(&self, reference: &str) -> Option<NodeKey> {
        let reference = reference.trim();
        if let Some(key) = self.by_uuid.get(reference) {
            return Some(self.canonical(*key));
        }
        if let Some(full) = self.aliases.get(reference) {
            if let Some(key) = self.by_uuid.get(full) {
                return Some(self.canonical(*key));
            }
        }
        self.retired.get(reference).map(|k| self.canonical(*k))
    }

    /// Register a full UUID, indexing its short forms. A node previously
    /// created from one of those short forms is upgraded in place.
    pub fn register_full_uuid(&mut self, full: &str) -> NodeKey {
        if let Some(key) = self.lookup(full) {
            return key;
        }
        let mut temporary: Vec<NodeKey> = Vec::new();
        for short in short_forms(full).iter().rev() {
            if let Some(key) = self.by_uuid.get(short).map(|k| self.canonical(*k)) {
                let uuid = &self.nodes[key.0].uuid;
                if !is_full_uuid(uuid) && !uuid.starts_with(SYNTHETIC_PREFIX) && !temporary.contains(&key) {
                    temporary.push(key);
                }
            }
        }

        let key = match temporary.first().copied() {
            Some(key) => {
                let node = &mut self.nodes[key.0];
                debug!(short = %node.uuid, full, "upgrading short node uuid");
                if node.placeholder && node.name == placeholder_name(&node.uuid) {
                    node.name = placeholder_name(full);
                }
                node.uuid = full.to_string();
                key
            }
            None => self.push(Node::new(full, placeholder_name(full))),
        };
        for other in temporary.into_iter().skip(1) {
            self.merge(other, key);
        }
        self.by_uuid.insert(full.to_string(), key);
        self.index_aliases(full);
        key
    }

    fn index_aliases(&mut self, full: &str) {
        for short in short_forms(full) {
            match self.aliases.get(&short) {
                Some(existing) if existing != full => {
                    debug!(alias = %short, existing = %existing, ignored = full, "uuid alias collision");
                }
                Some(_) => {}
                None => {
                    self.aliases.insert(short, full.to_string());
                }
            }
        }
    }

    /// Node for any printed reference: full UUIDs are registered, short or
    /// unrecognized forms get a temporary node keyed by the raw form.
    pub fn ensure_reference(&mut self, reference: &str) -> NodeKey {
        let reference = reference.trim();
        if is_full_uuid(reference) {
            return self.register_full_uuid(reference);
        }
        if let Some(key) = self.lookup(reference) {
            return key;
        }
        let key = self.push(Node::new(reference, placeholder_name(reference)));
        self.by_uuid.insert(reference.to_string(), key);
        key
    }

    /// Node known only by name so far. Reuses a node already carrying that
    /// name.
    pub fn ensure_named(&mut self, name: &str) -> NodeKey {
        if let Some(key) = self.by_synthetic_name.get(name) {
            return self.canonical(*key);
        }
        if let Some((key, _)) = self.live().find(|(_, n)| !n.placeholder && n.name == name) {
            return key;
        }
        let uuid = format!("{SYNTHETIC_PREFIX}{name}");
        let mut node = Node::new(uuid.clone(), name);
        node.placeholder = true;
        let key = self.push(node);
        self.by_uuid.insert(uuid, key);
        self.by_synthetic_name.insert(name.to_string(), key);
        key
    }

    pub fn is_synthetic(&self, key: NodeKey) -> bool {
        let node = self.get(key);
        node.uuid.starts_with(SYNTHETIC_PREFIX) || node.uuid == LOCAL_PLACEHOLDER
    }

    /// The node writing this log, created as a placeholder on first use.
    pub fn ensure_local(&mut self) -> NodeKey {
        if let Some(key) = self.local() {
            return key;
        }
        let key = match self.by_uuid.get(LOCAL_PLACEHOLDER) {
            Some(key) => *key,
            None => {
                let key = self.push(Node::new(LOCAL_PLACEHOLDER, LOCAL_PLACEHOLDER));
                self.by_uuid.insert(LOCAL_PLACEHOLDER.to_string(), key);
                key
            }
        };
        self.local = Some(key);
        key
    }

    /// Bind the local node to the UUID it announced. A different real UUID
    /// than before means a restart: the old one moves to `uuid_history`.
    pub fn bind_local_uuid(&mut self, full: &str) -> NodeKey {
        let local = self.ensure_local();
        let current = self.get(local).uuid.clone();
        if current == full {
            return local;
        }

        if let Some(existing) = self.lookup(full) {
            if existing != local {
                let (keep, drop) = if self.is_synthetic(local) {
                    (existing, local)
                } else {
                    self.retire_uuid(local, full);
                    (local, existing)
                };
                self.merge(drop, keep);
                self.local = Some(keep);
                self.by_uuid.insert(full.to_string(), keep);
                self.index_aliases(full);
                return keep;
            }
            return local;
        }

        if self.is_synthetic(local) {
            self.by_uuid.remove(&current);
            if self.get(local).name == LOCAL_PLACEHOLDER {
                self.get_mut(local).name = placeholder_name(full);
            }
            self.get_mut(local).uuid = full.to_string();
        } else {
            self.retire_uuid(local, full);
        }
        self.by_uuid.insert(full.to_string(), local);
        self.index_aliases(full);
        local
    }

    fn retire_uuid(&mut self, key: NodeKey, new_uuid: &str) {
        let old = self.get(key).uuid.clone();
        debug!(old = %old, new = new_uuid, "node restarted with new uuid");
        self.by_uuid.remove(&old);
        self.retired.insert(old.clone(), key);
        let node = self.get_mut(key);
        node.uuid_history.push(old);
        node.uuid = new_uuid.to_string();
    }

    /// Fold `from` into `into`; every key pointing at `from` now resolves to
    /// `into`.
    pub fn merge(&mut self, from: NodeKey, into: NodeKey) {
        let from = self.canonical(from);
        let into = self.canonical(into);
        if from == into {
            return;
        }
        let donor = self.nodes[from.0].clone();
        {
            let target = &mut self.nodes[into.0];
            if target.placeholder && !donor.placeholder {
                target.name = donor.name.clone();
                target.placeholder = false;
            }
            if target.node_id.is_none() {
                target.node_id = donor.node_id.clone();
            }
            if target.address.is_none() {
                target.address = donor.address.clone();
            }
            if target.status.is_none() {
                target.status = donor.status.clone();
            }
            for old in donor.uuid_history {
                if !target.uuid_history.contains(&old) {
                    target.uuid_history.push(old);
                }
            }
        }
        self.nodes[from.0].merged_into = Some(into);
        for key in self.by_uuid.values_mut().chain(self.retired.values_mut()) {
            if *key == from {
                *key = into;
            }
        }
        if self.local == Some(from) {
            self.local = Some(into);
        }
        debug!(from = %donor.uuid, into = %self.nodes[into.0].uuid, "merged nodes");
    }

    /// Fold name-only nodes into the real node that ended up with their name.
    pub fn merge_synthetic_by_name(&mut self) -> Vec<(NodeKey, NodeKey)> {
        let synthetic: Vec<(NodeKey, String)> = self
            .by_synthetic_name
            .iter()
            .map(|(name, key)| (self.canonical(*key), name.clone()))
            .filter(|(key, _)| self.get(*key).uuid.starts_with(SYNTHETIC_PREFIX))
            .collect();
        let mut merged = Vec::new();
        for (from, name) in synthetic {
            let target = self
                .live()
                .find(|(k, n)| *k != from && !n.placeholder && n.name == name && !n.uuid.starts_with(SYNTHETIC_PREFIX))
                .map(|(k, _)| k);
            if let Some(into) = target {
                self.merge(from, into);
                merged.push((from, into));
            }
        }
        merged
    }
}

/// Where a name observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    SstSelection,
    MemberSynced,
    ViewMember,
    LocalServer,
    Other,
}

impl NameSource {
    pub fn weight(&self) -> u8 {
        match self {
            NameSource::SstSelection => 90,
            NameSource::MemberSynced => 85,
            NameSource::ViewMember => 70,
            NameSource::LocalServer => 60,
            NameSource::Other => 40,
        }
    }
}

#[derive(Debug, Clone)]
struct NameEvidence {
    name: String,
    weight: u8,
    source: NameSource,
    first_seen: Timestamp,
    last_seen: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameOutcome {
    Unchanged,
    Resolved(String),
    /// Same weight, different name. The existing name is kept.
    Conflict { existing: String, candidate: String, weight: u8 },
}

/// Name evidence per node.
#[derive(Debug, Default)]
pub struct NameResolver {
    evidence: BTreeMap<NodeKey, Vec<NameEvidence>>,
    reported: BTreeSet<(NodeKey, String)>,
}

impl NameResolver {
    /// Record one observation and apply the resolution rule to the node.
    pub fn observe(
        &mut self,
        nodes: &mut NodeTable,
        key: NodeKey,
        name: &str,
        source: NameSource,
        at: Timestamp,
    ) -> NameOutcome {
        let key = nodes.canonical(key);
        let name = name.trim();
        if name.is_empty() {
            return NameOutcome::Unchanged;
        }
        let weight = source.weight();
        let before = self.best(key);

        let entries = self.evidence.entry(key).or_default();
        match entries.iter_mut().find(|e| e.name == name && e.source == source) {
            Some(e) => e.last_seen = e.last_seen.max(at),
            None => entries.push(NameEvidence {
                name: name.to_string(),
                weight,
                source,
                first_seen: at,
                last_seen: at,
            }),
        }

        let outcome = match before {
            Some((existing, existing_weight)) if existing_weight == weight && existing != name => {
                if self.reported.insert((key, name.to_string())) {
                    NameOutcome::Conflict {
                        existing,
                        candidate: name.to_string(),
                        weight,
                    }
                } else {
                    NameOutcome::Unchanged
                }
            }
            Some((existing, existing_weight)) if existing_weight >= weight || existing == name => {
                NameOutcome::Unchanged
            }
            _ => NameOutcome::Resolved(name.to_string()),
        };
        self.apply(nodes, key);
        outcome
    }

    /// Highest weight wins; ties keep the earliest first sighting.
    fn best(&self, key: NodeKey) -> Option<(String, u8)> {
        let entries = self.evidence.get(&key)?;
        let mut best: Option<&NameEvidence> = None;
        for e in entries {
            best = match best {
                Some(b) if b.weight > e.weight => Some(b),
                Some(b) if b.weight == e.weight && b.first_seen <= e.first_seen => Some(b),
                _ => Some(e),
            };
        }
        best.map(|e| (e.name.clone(), e.weight))
    }

    fn apply(&self, nodes: &mut NodeTable, key: NodeKey) {
        if let Some((name, _)) = self.best(key) {
            let node = nodes.get_mut(key);
            node.name = name;
            node.placeholder = false;
        }
    }

    /// Re-home evidence after node merges and re-apply names.
    pub fn finalize(&mut self, nodes: &mut NodeTable) {
        let keys: Vec<NodeKey> = self.evidence.keys().copied().collect();
        for key in keys {
            let canonical = nodes.canonical(key);
            if canonical != key {
                if let Some(moved) = self.evidence.remove(&key) {
                    self.evidence.entry(canonical).or_default().extend(moved);
                }
            }
        }
        let keys: Vec<NodeKey> = self.evidence.keys().copied().collect();
        for key in keys {
            self.apply(nodes, key);
        }
    }
}

/// Where an address observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    ListeningAt,
    SstJoinerAddress,
    PeerConnection,
    IstAddress,
    DonorObservedPeer,
    ClusterConfig,
}

impl AddressSource {
    pub fn weight(&self) -> u8 {
        match self {
            AddressSource::ListeningAt => 100,
            AddressSource::SstJoinerAddress => 90,
            AddressSource::PeerConnection => 80,
            AddressSource::IstAddress => 70,
            AddressSource::DonorObservedPeer => 60,
            AddressSource::ClusterConfig => 10,
        }
    }
}

/// Address evidence is keyed by node, or by name while no node is known.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum AddressKey {
    Node(NodeKey),
    Name(String),
}

#[derive(Debug, Clone, Copy)]
struct AddressEvidence {
    weight: u8,
    count: u32,
    first_seen: Timestamp,
    last_seen: Timestamp,
}

impl AddressEvidence {
    fn absorb(&mut self, other: &AddressEvidence) {
        self.weight = self.weight.max(other.weight);
        self.count += other.count;
        self.first_seen = self.first_seen.min(other.first_seen);
        self.last_seen = self.last_seen.max(other.last_seen);
    }

    /// Higher weight, then more sightings, then earliest first seen.
    fn beats(&self, other: &AddressEvidence) -> bool {
        (self.weight, self.count, std::cmp::Reverse(self.first_seen))
            > (other.weight, other.count, std::cmp::Reverse(other.first_seen))
    }
}

/// Strip scheme and port from an endpoint; `None` for wildcard binds.
pub fn normalize_host(endpoint: &str) -> Option<String> {
    let trimmed = endpoint
        .trim()
        .trim_end_matches(|c: char| matches!(c, ',' | ')' | '\'' | '"' | '.'))
        .trim_start_matches('\'');
    let without_scheme = trimmed.split("://").last().unwrap_or(trimmed);
    let host = if let Some(rest) = without_scheme.strip_prefix('[') {
        rest.split(']').next().unwrap_or(rest)
    } else if without_scheme.matches(':').count() == 1 {
        without_scheme.split(':').next().unwrap_or(without_scheme)
    } else {
        without_scheme
    };
    let host = host.split('/').next().unwrap_or(host);
    match host {
        "" | "0.0.0.0" | "::" | "*" => None,
        h => Some(h.to_string()),
    }
}

/// Trailing `:port` of an endpoint, if any.
pub fn port_of(endpoint: &str) -> Option<u16> {
    endpoint
        .trim_end_matches(|c: char| matches!(c, ',' | ')' | '\''))
        .rsplit(':')
        .next()
        .and_then(|p| p.parse().ok())
}

/// Address evidence per node or provisional name.
#[derive(Debug, Default)]
pub struct AddressResolver {
    evidence: BTreeMap<AddressKey, BTreeMap<String, AddressEvidence>>,
}

impl AddressResolver {
    pub fn observe(&mut self, key: AddressKey, endpoint: &str, source: AddressSource, at: Timestamp) {
        let Some(host) = normalize_host(endpoint) else {
            return;
        };
        let incoming = AddressEvidence {
            weight: source.weight(),
            count: 1,
            first_seen: at,
            last_seen: at,
        };
        self.evidence
            .entry(key)
            .or_default()
            .entry(host)
            .and_modify(|e| e.absorb(&incoming))
            .or_insert(incoming);
    }

    pub fn best(&self, key: &AddressKey) -> Option<&str> {
        let hosts = self.evidence.get(key)?;
        let mut best: Option<(&String, &AddressEvidence)> = None;
        for (host, e) in hosts {
            best = match best {
                Some((bh, be)) if !e.beats(be) => Some((bh, be)),
                _ => Some((host, e)),
            };
        }
        best.map(|(h, _)| h.as_str())
    }

    /// Move name-keyed evidence onto nodes and merged nodes onto survivors,
    /// then write each node's best address. Runs after name resolution.
    pub fn finalize(&mut self, nodes: &mut NodeTable) {
        let keys: Vec<AddressKey> = self.evidence.keys().cloned().collect();
        for key in keys {
            let target = match &key {
                AddressKey::Node(k) => Some(nodes.canonical(*k)),
                AddressKey::Name(name) => nodes
                    .live()
                    .find(|(_, n)| !n.placeholder && &n.name == name)
                    .map(|(k, _)| k),
            };
            let Some(target) = target else {
                continue;
            };
            let target_key = AddressKey::Node(target);
            if target_key == key {
                continue;
            }
            if let Some(moved) = self.evidence.remove(&key) {
                let slot = self.evidence.entry(target_key).or_default();
                for (host, e) in moved {
                    slot.entry(host).and_modify(|x| x.absorb(&e)).or_insert(e);
                }
            }
        }

        let resolved: Vec<(NodeKey, String)> = self
            .evidence
            .keys()
            .filter_map(|k| match k {
                AddressKey::Node(node) => self.best(k).map(|h| (*node, h.to_string())),
                AddressKey::Name(_) => None,
            })
            .collect();
        for (key, host) in resolved {
            nodes.get_mut(key).address = Some(host);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::parse_canonical;
    use proptest::prelude::*;

    const FULL: &str = "378c0ec7-9221-11f0-a3db-8e2d5b0f3a12";

    fn at(s: &str) -> Timestamp {
        parse_canonical(s).unwrap()
    }

    #[test]
    fn test_short_forms() {
        assert_eq!(short_forms(FULL), vec!["378c0ec7", "378c0ec7-a3db"]);
        assert!(short_forms("378c0ec7-a3db").is_empty());
        assert!(is_full_uuid(FULL));
        assert!(!is_full_uuid("378c0ec7-a3db"));
    }

    #[test]
    fn test_short_reference_resolves_after_full_registration() {
        let mut table = NodeTable::default();
        let key = table.register_full_uuid(FULL);
        assert_eq!(table.ensure_reference("378c0ec7-a3db"), key);
        assert_eq!(table.lookup("378c0ec7"), Some(key));
        assert_eq!(table.live().count(), 1);
    }

    #[test]
    fn test_short_node_upgraded_in_place() {
        let mut table = NodeTable::default();
        let short = table.ensure_reference("378c0ec7-a3db");
        let full = table.register_full_uuid(FULL);
        assert_eq!(short, full);
        assert_eq!(table.get(full).uuid, FULL);
        assert_eq!(table.live().count(), 1);
    }

    #[test]
    fn test_alias_collision_keeps_first_mapping() {
        let mut table = NodeTable::default();
        let a = table.register_full_uuid(FULL);
        let _b = table.register_full_uuid("378c0ec7-0000-11f0-beef-000000000001");
        assert_eq!(table.lookup("378c0ec7"), Some(a));
        assert_eq!(table.aliases().get("378c0ec7").map(String::as_str), Some(FULL));
    }

    #[test]
    fn test_local_restart_keeps_history() {
        let mut table = NodeTable::default();
        let first = table.bind_local_uuid(FULL);
        let second = table.bind_local_uuid("5b1c2d3e-0000-11f0-b4ec-000000000002");
        assert_eq!(first, second);
        let node = table.get(second);
        assert_eq!(node.uuid_history, vec![FULL.to_string()]);
        assert_eq!(table.lookup(FULL), Some(second));
    }

    #[test]
    fn test_local_merges_into_already_seen_uuid() {
        let mut table = NodeTable::default();
        let local = table.ensure_local();
        let seen = table.register_full_uuid(FULL);
        assert_ne!(local, seen);
        let bound = table.bind_local_uuid(FULL);
        assert_eq!(bound, seen);
        assert_eq!(table.local(), Some(seen));
        assert_eq!(table.canonical(local), seen);
    }

    #[test]
    fn test_name_resolution_prefers_weight_then_earliest() {
        let mut table = NodeTable::default();
        let key = table.register_full_uuid(FULL);
        let mut names = NameResolver::default();

        let outcome = names.observe(&mut table, key, "tmp-name", NameSource::Other, at("2025-01-01 00:00:00"));
        assert_eq!(outcome, NameOutcome::Resolved("tmp-name".into()));
        names.observe(&mut table, key, "db1", NameSource::ViewMember, at("2025-01-01 00:01:00"));
        assert_eq!(table.get(key).name, "db1");

        let lower = names.observe(&mut table, key, "other", NameSource::LocalServer, at("2025-01-01 00:02:00"));
        assert_eq!(lower, NameOutcome::Unchanged);
        assert_eq!(table.get(key).name, "db1");

        let conflict = names.observe(&mut table, key, "db9", NameSource::ViewMember, at("2025-01-01 00:03:00"));
        assert!(matches!(conflict, NameOutcome::Conflict { .. }));
        assert_eq!(table.get(key).name, "db1");

        names.observe(&mut table, key, "db1-real", NameSource::SstSelection, at("2025-01-01 00:04:00"));
        assert_eq!(table.get(key).name, "db1-real");
        assert!(!table.get(key).placeholder);
    }

    #[test]
    fn test_synthetic_named_node_merges_into_real() {
        let mut table = NodeTable::default();
        let mut names = NameResolver::default();
        let synthetic = table.ensure_named("db2");
        let real = table.register_full_uuid(FULL);
        names.observe(&mut table, real, "db2", NameSource::ViewMember, at("2025-01-01 00:00:00"));
        let merged = table.merge_synthetic_by_name();
        assert_eq!(merged, vec![(synthetic, real)]);
        assert_eq!(table.canonical(synthetic), real);
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("tcp://10.0.0.2:4567").as_deref(), Some("10.0.0.2"));
        assert_eq!(normalize_host("10.0.0.2:4444/xtrabackup_sst//1").as_deref(), Some("10.0.0.2"));
        assert_eq!(normalize_host("[fe80::1]:4567").as_deref(), Some("fe80::1"));
        assert_eq!(normalize_host("tcp://0.0.0.0:4567"), None);
        assert_eq!(port_of("tcp://10.0.0.2:4568"), Some(4568));
    }

    #[test]
    fn test_address_best_by_weight_count_then_first_seen() {
        let mut table = NodeTable::default();
        let key = table.register_full_uuid(FULL);
        let mut addrs = AddressResolver::default();
        let k = AddressKey::Node(key);
        addrs.observe(k.clone(), "10.0.0.9", AddressSource::ClusterConfig, at("2025-01-01 00:00:00"));
        addrs.observe(k.clone(), "tcp://10.0.0.1:4567", AddressSource::PeerConnection, at("2025-01-01 00:01:00"));
        addrs.observe(k.clone(), "tcp://10.0.0.2:4567", AddressSource::PeerConnection, at("2025-01-01 00:02:00"));
        addrs.observe(k.clone(), "tcp://10.0.0.2:4567", AddressSource::PeerConnection, at("2025-01-01 00:03:00"));
        assert_eq!(addrs.best(&k), Some("10.0.0.2"));

        addrs.observe(AddressKey::Name("db1".into()), "tcp://10.0.0.7:4567", AddressSource::ListeningAt, at("2025-01-01 00:04:00"));
        let mut names = NameResolver::default();
        names.observe(&mut table, key, "db1", NameSource::ViewMember, at("2025-01-01 00:00:00"));
        addrs.finalize(&mut table);
        assert_eq!(table.get(key).address.as_deref(), Some("10.0.0.7"));
    }

    #[test]
    fn test_address_ties_keep_earliest() {
        let mut addrs = AddressResolver::default();
        let k = AddressKey::Name("db3".into());
        addrs.observe(k.clone(), "10.0.0.5:4568", AddressSource::IstAddress, at("2025-01-01 00:05:00"));
        addrs.observe(k.clone(), "10.0.0.4:4568", AddressSource::IstAddress, at("2025-01-01 00:01:00"));
        assert_eq!(addrs.best(&k), Some("10.0.0.4"));
    }

    fn source_strategy() -> impl Strategy<Value = NameSource> {
        prop_oneof![
            Just(NameSource::SstSelection),
            Just(NameSource::MemberSynced),
            Just(NameSource::ViewMember),
            Just(NameSource::LocalServer),
            Just(NameSource::Other),
        ]
    }

    proptest! {
        #[test]
        fn prop_name_never_changes_to_lower_weight(
            observations in prop::collection::vec((source_strategy(), 0usize..4), 1..40)
        ) {
            let mut table = NodeTable::default();
            let key = table.register_full_uuid(FULL);
            let mut names = NameResolver::default();
            let base = at("2025-01-01 00:00:00");
            let mut best_weight = 0u8;
            let mut current: Option<String> = None;

            for (i, (source, name_idx)) in observations.iter().enumerate() {
                let name = format!("db{name_idx}");
                let ts = base + chrono::Duration::seconds(i as i64);
                names.observe(&mut table, key, &name, *source, ts);
                let resolved = table.get(key).name.clone();
                if source.weight() > best_weight {
                    prop_assert_eq!(&resolved, &name);
                    best_weight = source.weight();
                } else if let Some(prev) = &current {
                    prop_assert_eq!(&resolved, prev);
                }
                current = Some(resolved);
            }
        }
    }
}
