//! Export the graph as a batch snapshot or as a Cypher script.
//!
//! ```text
//! Objects → export_snapshot()    → CollectedBatch JSON → import() elsewhere
//! Objects → export_cypher_dump() → MERGE statements    → any Cypher database
//! ```
//!
//! Edges are written against the target's identifier (SID, else DN). An
//! edge whose target has no identifier is written from the target's side
//! as an incoming edge; if neither end has one it cannot be expressed and
//! is counted in [`ExportStats::edges_dropped`].

use std::io::Write;

use crate::batch::{BatchKind, CollectedBatch, CollectedEdge, CollectedObject, RawValues};
use crate::model::*;
use crate::objects::Objects;
use crate::Result;

/// What an export wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub objects: usize,
    pub edges: usize,
    pub edges_dropped: usize,
}

/// Identifier an edge can point at: SID text, else distinguished name.
fn identifier(objects: &Objects, id: ObjectId) -> Option<String> {
    if let Some(sid) = objects.sid_of(id) {
        return Some(sid.to_string());
    }
    let obj = objects.get(id)?;
    obj.first(objects.distinguished_name_attribute())
        .and_then(AttributeValue::as_str)
        .map(str::to_string)
}

/// Rebuild the container as one batch. Importing the result into an empty
/// container reproduces the same objects, attributes and edges; the batch
/// is marked [`BatchKind::Snapshot`] so local SIDs are not remapped again.
pub fn snapshot(objects: &Objects) -> (CollectedBatch, ExportStats) {
    let catalog = objects.registry().edges.catalog();
    let mut stats = ExportStats::default();
    let ids: Vec<Option<String>> = objects.iter().map(|o| identifier(objects, o.id())).collect();

    let mut out: Vec<CollectedObject> = objects
        .iter()
        .map(|obj| CollectedObject {
            attributes: obj
                .attributes()
                .map(|(attr, values)| (objects.registry().attributes.name(attr).to_string(), RawValues::from(values)))
                .collect(),
            edges: Vec::new(),
        })
        .collect();

    for obj in objects.iter() {
        let source = obj.id();
        for (target, kinds) in obj.edges(Direction::Outgoing, EdgeBitmap::EMPTY) {
            let (holder, other, direction) = match (&ids[target.index()], &ids[source.index()]) {
                (Some(t), _) => (source, t, Direction::Outgoing),
                (None, Some(s)) => (target, s, Direction::Incoming),
                (None, None) => {
                    stats.edges_dropped += kinds.count() as usize;
                    tracing::warn!(%source, %target, "edge between objects without identifiers not exported");
                    continue;
                }
            };
            for kind in kinds.iter() {
                out[holder.index()].edges.push(CollectedEdge {
                    kind: catalog.name(kind).to_string(),
                    target: other.clone(),
                    direction,
                });
                stats.edges += 1;
            }
        }
    }

    stats.objects = out.len();
    let batch = CollectedBatch { source: "snapshot".to_string(), kind: BatchKind::Snapshot, objects: out };
    (batch, stats)
}

/// Write [`snapshot`] as JSON.
pub fn export_snapshot(objects: &Objects, writer: &mut dyn Write) -> Result<ExportStats> {
    let (batch, stats) = snapshot(objects);
    serde_json::to_writer_pretty(&mut *writer, &batch)?;
    writeln!(writer)?;
    tracing::info!(objects = stats.objects, edges = stats.edges, dropped = stats.edges_dropped, "snapshot exported");
    Ok(stats)
}

/// Export the graph as a Cypher script of `MERGE` statements.
///
/// Nodes carry the `Object` label plus their `objectType` when it is a
/// plain word, keyed by `objectSid`, else `distinguishedName`, else
/// `_id`. Every edge kind becomes its own relationship.
pub fn export_cypher_dump(objects: &Objects, writer: &mut dyn Write) -> Result<ExportStats> {
    let catalog = objects.registry().edges.catalog();
    let attributes = &objects.registry().attributes;
    let object_type = attributes.lookup(crate::registry::defaults::OBJECT_TYPE);
    let mut stats = ExportStats::default();

    writeln!(writer, "// secgraph Cypher DUMP")?;
    writeln!(writer, "// Objects: {}", objects.len())?;
    writeln!(writer, "// Edges: {}", objects.edge_count())?;
    writeln!(writer)?;

    let keys: Vec<String> = objects.iter().map(|o| node_key(objects, o.id())).collect();

    for obj in objects.iter() {
        let label = object_type
            .and_then(|a| obj.first(a))
            .and_then(AttributeValue::as_str)
            .filter(|t| is_plain_identifier(t))
            .map(|t| format!(":{t}"))
            .unwrap_or_default();
        let props: Vec<String> = obj
            .attributes()
            .map(|(attr, values)| format!("n.{} = {}", quote_name(&attributes.name(attr)), format_values(values)))
            .collect();

        write!(writer, "MERGE (n:Object {{{}}})", keys[obj.id().index()])?;
        if !label.is_empty() {
            write!(writer, " SET n{label}")?;
        }
        if !props.is_empty() {
            write!(writer, " SET {}", props.join(", "))?;
        }
        writeln!(writer, ";")?;
        stats.objects += 1;
    }

    writeln!(writer)?;
    writeln!(writer, "// Relationships")?;

    for obj in objects.iter() {
        for (target, kinds) in obj.edges(Direction::Outgoing, EdgeBitmap::EMPTY) {
            for kind in kinds.iter() {
                writeln!(
                    writer,
                    "MATCH (a:Object {{{}}}), (b:Object {{{}}}) MERGE (a)-[:{}]->(b);",
                    keys[obj.id().index()],
                    keys[target.index()],
                    quote_name(catalog.name(kind)),
                )?;
                stats.edges += 1;
            }
        }
    }

    Ok(stats)
}

fn node_key(objects: &Objects, id: ObjectId) -> String {
    if let Some(sid) = objects.sid_of(id) {
        return format!("objectSid: {}", format_value(&AttributeValue::Sid(sid.clone())));
    }
    if let Some(dn) = objects.get(id).and_then(|o| o.first(objects.distinguished_name_attribute())) {
        return format!("distinguishedName: {}", format_value(dn));
    }
    format!("_id: {}", id.0)
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Backtick-quote a property or relationship name unless it is plain.
fn quote_name(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

fn format_values(values: &AttributeValues) -> String {
    match (values.len(), values.first()) {
        (1, Some(v)) => format_value(v),
        _ => {
            let inner: Vec<String> = values.iter().map(format_value).collect();
            format!("[{}]", inner.join(", "))
        }
    }
}

/// Format a value as a Cypher literal.
fn format_value(value: &AttributeValue) -> String {
    let quote = |s: &str| format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"));
    match value {
        AttributeValue::String(s) => quote(s),
        AttributeValue::Sid(s) => quote(&s.to_string()),
        AttributeValue::Int(i) => i.to_string(),
        AttributeValue::Bool(b) => b.to_string(),
        AttributeValue::Timestamp(t) => format!("datetime('{}')", t.to_rfc3339()),
        AttributeValue::Bytes(b) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
            quote(&hex)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::batch::CollectedObject;
    use crate::registry::Registry;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&AttributeValue::from("it's")), r"'it\'s'");
        assert_eq!(format_value(&AttributeValue::Int(42)), "42");
        assert_eq!(format_value(&AttributeValue::Bool(true)), "true");
        assert_eq!(format_value(&AttributeValue::Bytes(vec![1, 255])), "'01ff'");
        assert_eq!(format_value(&AttributeValue::Sid(well_known::everyone())), "'S-1-1-0'");
    }

    #[test]
    fn test_quote_name() {
        assert_eq!(quote_name("AdminRights"), "AdminRights");
        assert_eq!(quote_name("msDS-Thing"), "`msDS-Thing`");
    }

    #[test]
    fn test_cypher_dump() {
        let mut objs = Objects::with_default_indexes(Arc::new(Registry::with_defaults().unwrap())).unwrap();
        objs.import(&CollectedBatch::new("t").with_object(
            CollectedObject::new()
                .with_sid("S-1-5-21-1-2-3-500".parse().unwrap())
                .with("objectType", "Person")
                .edge("AdminRights", "CN=WS01"),
        ));
        let mut out = Vec::new();
        let stats = export_cypher_dump(&objs, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(stats, ExportStats { objects: 2, edges: 1, edges_dropped: 0 });
        assert!(text.contains("MERGE (n:Object {objectSid: 'S-1-5-21-1-2-3-500'}) SET n:Person"));
        assert!(text.contains(
            "MATCH (a:Object {objectSid: 'S-1-5-21-1-2-3-500'}), (b:Object {distinguishedName: 'CN=WS01'}) MERGE (a)-[:AdminRights]->(b);"
        ));
    }

    #[test]
    fn test_edge_to_anonymous_object_is_written_incoming() {
        let registry = Arc::new(Registry::with_defaults().unwrap());
        let mut objs = Objects::with_default_indexes(registry.clone()).unwrap();
        let name = registry.attributes.lookup("name").unwrap();
        let dn = registry.attributes.lookup("distinguishedName").unwrap();
        let a = objs.add_object([(dn, AttributeValues::single("CN=A"))]).unwrap();
        let anon = objs.add_object([(name, AttributeValues::single("anon"))]).unwrap();
        let lonely = objs.add_object([(name, AttributeValues::single("lonely"))]).unwrap();
        let hosts = registry.edges.lookup("Hosts").unwrap();
        objs.add_edge(a, anon, hosts).unwrap();
        objs.add_edge(anon, lonely, hosts).unwrap();

        let (batch, stats) = snapshot(&objs);
        assert_eq!(stats.edges, 1);
        assert_eq!(stats.edges_dropped, 1);
        let edge = &batch.objects[anon.index()].edges[0];
        assert_eq!((edge.target.as_str(), edge.direction), ("CN=A", Direction::Incoming));
    }
}
