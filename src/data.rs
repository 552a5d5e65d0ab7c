use self::osm::Element;
use self::rows::{NodeRow, RelationRow, Table, WayRow};
use crate::errors::Result;

pub mod osm;
pub mod rows;

/// Rows produced from an .osm file, one list per output table. Each table only
/// takes elements of its own type.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct OsmTables {
    pub nodes: Vec<NodeRow>,
    pub ways: Vec<WayRow>,
    pub relations: Vec<RelationRow>,
}

impl OsmTables {
    /// Offers a completed element to `table`. Returns whether a row was added.
    pub fn accept(&mut self, table: Table, element: &Element) -> Result<bool> {
        match (table, element) {
            (Table::Nodes, Element::Node(node)) => self.nodes.push(NodeRow::from_node(node)?),
            (Table::Ways, Element::Way(way)) => self.ways.push(WayRow::from_way(way)?),
            (Table::Relations, Element::Relation(relation)) => {
                self.relations.push(RelationRow::from_relation(relation)?)
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    pub fn len(&self, table: Table) -> usize {
        match table {
            Table::Nodes => self.nodes.len(),
            Table::Ways => self.ways.len(),
            Table::Relations => self.relations.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        Table::ALL.iter().all(|table| self.len(*table) == 0)
    }
}
