use std::collections::HashMap;
use std::fmt;

pub type OsmId = u64;

/// The three OSM element types. Their type tags prefix numeric ids to form one
/// flat id namespace (`N12`, `W7`, `R3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    /// Markup name to kind, e.g. the `type` attribute of a relation member.
    pub fn from_name(name: &str) -> Option<ElementKind> {
        match name {
            "node" => Some(ElementKind::Node),
            "way" => Some(ElementKind::Way),
            "relation" => Some(ElementKind::Relation),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
        }
    }

    pub fn type_tag(self) -> char {
        match self {
            ElementKind::Node => 'N',
            ElementKind::Way => 'W',
            ElementKind::Relation => 'R',
        }
    }

    pub fn global_id(self, id: impl fmt::Display) -> String {
        format!("{}{}", self.type_tag(), id)
    }
}

/// Attributes shared by nodes, ways and relations.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementInfo {
    pub id: OsmId,
    pub user: Option<String>,
    pub uid: u64,
    /// ISO-8601, kept as written.
    pub timestamp: Option<String>,
    pub visible: bool,
    pub version: u32,
    pub changeset: u64,
    pub tags: HashMap<String, String>,
}

impl ElementInfo {
    pub fn new(id: OsmId) -> Self {
        ElementInfo {
            id,
            user: None,
            uid: 0,
            timestamp: None,
            visible: true,
            version: 1,
            changeset: 0,
            tags: HashMap::new(),
        }
    }

    /// Sets a tag, replacing any previous value for the key.
    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn remove_tag(&mut self, key: &str) -> Option<String> {
        self.tags.remove(key)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub info: ElementInfo,
    pub lat: f64,
    pub lon: f64,
}

impl Node {
    pub fn new(id: OsmId, lat: f64, lon: f64) -> Self {
        Node {
            info: ElementInfo::new(id),
            lat,
            lon,
        }
    }
}

/// An ordered list of node references (`N<id>`), in path order.
#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub info: ElementInfo,
    nodes: Vec<String>,
}

impl Way {
    pub const MIN_NODES: usize = 2;

    pub fn new(id: OsmId) -> Self {
        Way {
            info: ElementInfo::new(id),
            nodes: Vec::new(),
        }
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn add_node(&mut self, node: impl Into<String>) {
        self.nodes.push(node.into());
    }

    pub fn remove_node(&mut self, index: usize) -> Option<String> {
        (index < self.nodes.len()).then(|| self.nodes.remove(index))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// May be empty.
    pub role: String,
    /// Global id of the member (`N…`, `W…` or `R…`).
    pub element: String,
}

/// An ordered list of (role, member) pairs. The same member may appear more
/// than once with different roles.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub info: ElementInfo,
    members: Vec<Member>,
}

impl Relation {
    pub const MIN_MEMBERS: usize = 1;

    pub fn new(id: OsmId) -> Self {
        Relation {
            info: ElementInfo::new(id),
            members: Vec::new(),
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|member| member.element.as_str())
    }

    /// Role of the first member entry for `element`.
    pub fn member_role(&self, element: &str) -> Option<&str> {
        self.members
            .iter()
            .find(|member| member.element == element)
            .map(|member| member.role.as_str())
    }

    pub fn add_member(&mut self, role: impl Into<String>, element: impl Into<String>) {
        self.members.push(Member {
            role: role.into(),
            element: element.into(),
        });
    }

    /// Removes the first member entry for `element`.
    pub fn remove_member(&mut self, element: &str) -> Option<Member> {
        let index = self.members.iter().position(|member| member.element == element)?;
        Some(self.members.remove(index))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Node(_) => ElementKind::Node,
            Element::Way(_) => ElementKind::Way,
            Element::Relation(_) => ElementKind::Relation,
        }
    }

    pub fn info(&self) -> &ElementInfo {
        match self {
            Element::Node(node) => &node.info,
            Element::Way(way) => &way.info,
            Element::Relation(relation) => &relation.info,
        }
    }

    pub fn info_mut(&mut self) -> &mut ElementInfo {
        match self {
            Element::Node(node) => &mut node.info,
            Element::Way(way) => &mut way.info,
            Element::Relation(relation) => &mut relation.info,
        }
    }

    pub fn id(&self) -> OsmId {
        self.info().id
    }

    pub fn global_id(&self) -> String {
        self.kind().global_id(self.id())
    }

    /// Whether the element may be emitted once its closing markup is read:
    /// ways need two nodes, relations one member.
    pub fn is_complete(&self) -> bool {
        match self {
            Element::Node(_) => true,
            Element::Way(way) => way.nodes.len() >= Way::MIN_NODES,
            Element::Relation(relation) => relation.members.len() >= Relation::MIN_MEMBERS,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Element {} ({} tags)", self.global_id(), self.info().tags.len())
    }
}
