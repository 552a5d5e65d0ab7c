use std::collections::BTreeMap;

use serde::Deserialize;

use super::osm::{ElementInfo, ElementKind, Node, Relation, Way};
use crate::errors::Result;

/// Role written for relation members that have none.
pub const NULL_ROLE: &str = "null";

/// Output tables. Each one keeps rows of a single element type.
#[derive(Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Nodes,
    Ways,
    Relations,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Nodes, Table::Ways, Table::Relations];

    /// Markups that can affect the rows of this table.
    pub fn markup_names(self) -> &'static [&'static str] {
        match self {
            Table::Nodes => &["node", "tag"],
            Table::Ways => &["way", "nd", "tag"],
            Table::Relations => &["relation", "member", "tag"],
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Table::Nodes => "nodes.jsonl",
            Table::Ways => "ways.jsonl",
            Table::Relations => "relations.jsonl",
        }
    }
}

/// Columns shared by the three tables.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, serde::Serialize, Deserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct CommonColumns {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "UserID")]
    pub user_id: u64,
    #[serde(rename = "Timestamp")]
    pub timestamp: Option<String>,
    #[serde(rename = "IsVisible")]
    pub is_visible: bool,
    #[serde(rename = "Version")]
    pub version: i32,
    #[serde(rename = "ChangesetID")]
    pub changeset_id: u64,
    #[serde(rename = "Tags")]
    pub tags: BTreeMap<String, String>,
}

impl CommonColumns {
    fn new(id: String, info: &ElementInfo) -> Result<Self> {
        Ok(CommonColumns {
            id,
            user_id: info.uid,
            timestamp: info.timestamp.clone(),
            is_visible: info.visible,
            version: i32::try_from(info.version)?,
            changeset_id: info.changeset,
            tags: info.tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, serde::Serialize, Deserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct NodeRow {
    #[serde(flatten)]
    pub common: CommonColumns,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
}

impl NodeRow {
    pub fn from_node(node: &Node) -> Result<Self> {
        Ok(NodeRow {
            common: CommonColumns::new(ElementKind::Node.global_id(node.info.id), &node.info)?,
            latitude: node.lat,
            longitude: node.lon,
        })
    }
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, serde::Serialize, Deserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct WayRow {
    #[serde(flatten)]
    pub common: CommonColumns,
    #[serde(rename = "Nodes")]
    pub nodes: Vec<String>,
}

impl WayRow {
    pub fn from_way(way: &Way) -> Result<Self> {
        Ok(WayRow {
            common: CommonColumns::new(ElementKind::Way.global_id(way.info.id), &way.info)?,
            nodes: way.nodes().to_vec(),
        })
    }
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, serde::Serialize, Deserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct RelationRow {
    #[serde(flatten)]
    pub common: CommonColumns,
    /// Member id to role. A member listed twice keeps its first role.
    #[serde(rename = "Members")]
    pub members: BTreeMap<String, String>,
}

impl RelationRow {
    pub fn from_relation(relation: &Relation) -> Result<Self> {
        let mut members = BTreeMap::new();
        for member in relation.members() {
            members.entry(member.element.clone()).or_insert_with(|| {
                if member.role.is_empty() {
                    NULL_ROLE.to_string()
                } else {
                    member.role.clone()
                }
            });
        }

        Ok(RelationRow {
            common: CommonColumns::new(ElementKind::Relation.global_id(relation.info.id), &relation.info)?,
            members,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn node_columns() {
        let mut node = Node::new(1, 54.09, 12.24);
        node.info.user = Some("a".to_string());
        node.info.uid = 1;
        node.info.changeset = 3;
        node.info.timestamp = Some("2020-01-01T00:00:00Z".to_string());
        node.info.add_tag("name", "Neu Broderstorf");

        let row = NodeRow::from_node(&node).unwrap();
        assert_eq!(row.common.id, "N1");
        assert_eq!(row.common.user_id, 1);
        assert_eq!(row.common.version, 1);
        assert_eq!(row.common.changeset_id, 3);
        assert!(row.common.is_visible);
        assert_eq!(row.latitude, 54.09);
        assert_eq!(row.longitude, 12.24);

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["ID"], "N1");
        assert_eq!(json["Latitude"], 54.09);
        assert_eq!(json["Timestamp"], "2020-01-01T00:00:00Z");
        assert_eq!(json["Tags"]["name"], "Neu Broderstorf");
    }

    #[test]
    fn way_keeps_node_order() {
        let mut way = Way::new(5);
        way.add_node("N2");
        way.add_node("N1");
        way.add_node("N2");

        let row = WayRow::from_way(&way).unwrap();
        assert_eq!(row.common.id, "W5");
        assert_eq!(row.nodes, vec!["N2", "N1", "N2"]);
    }

    #[test]
    fn empty_roles_become_null_and_first_role_wins() {
        let mut relation = Relation::new(9);
        relation.add_member("stop", "N1");
        relation.add_member("", "W2");
        relation.add_member("platform", "N1");

        let row = RelationRow::from_relation(&relation).unwrap();
        assert_eq!(row.common.id, "R9");
        assert_eq!(
            row.members,
            BTreeMap::from([
                ("N1".to_string(), "stop".to_string()),
                ("W2".to_string(), NULL_ROLE.to_string()),
            ])
        );
    }

    #[test]
    fn version_overflow_is_an_error() {
        let mut way = Way::new(5);
        way.info.version = u32::MAX;
        assert!(WayRow::from_way(&way).is_err());
    }

    #[test]
    fn table_names() {
        let tables: Vec<Table> = serde_json::from_str(r#"["nodes", "relations"]"#).unwrap();
        assert_eq!(tables, vec![Table::Nodes, Table::Relations]);
        assert_eq!(Table::Ways.file_name(), "ways.jsonl");
        assert!(Table::Relations.markup_names().contains(&"member"));
    }
}
