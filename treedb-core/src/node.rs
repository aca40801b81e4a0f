use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a node record in TreeDB.
///
/// Every node version gets its own id: path copying never reuses the id of the record
/// it copies, so an id names exactly one immutable record for its whole life.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Mints a fresh, random identifier.
    #[inline]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[inline]
    pub const fn from_raw(raw: Uuid) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(&self) -> Uuid {
        self.0
    }
}

impl Display for NodeId {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The color of a red-black tree node. Persisted as `0` (red) or `1` (black).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Color {
    Red,
    Black,
}

impl From<Color> for u8 {
    #[inline]
    fn from(value: Color) -> Self {
        match value {
            Color::Red => 0,
            Color::Black => 1,
        }
    }
}

impl TryFrom<u8> for Color {
    type Error = String;

    #[inline]
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Red),
            1 => Ok(Self::Black),
            other => Err(format!("invalid node color {other}")),
        }
    }
}

/// Which child of a node a path goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

impl Side {
    #[inline]
    pub(crate) fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// A node record of the tree.
///
/// Records are never changed once committed to a store. Inside a transaction a freshly
/// minted record may still be edited until the transaction commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node<K, V> {
    pub(crate) id: NodeId,
    pub(crate) color: Color,
    pub(crate) key: K,
    pub(crate) value: V,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) left_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) right_id: Option<NodeId>,
    /// Size of the subtree rooted at this node.
    pub(crate) count: usize,
}

impl<K, V> Node<K, V> {
    /// A new red leaf with a fresh id.
    #[inline]
    pub(crate) fn leaf(key: K, value: V) -> Self {
        Self {
            id: NodeId::generate(),
            color: Color::Red,
            key,
            value,
            left_id: None,
            right_id: None,
            count: 1,
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn color(&self) -> Color {
        self.color
    }

    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub fn left_id(&self) -> Option<NodeId> {
        self.left_id
    }

    #[inline]
    pub fn right_id(&self) -> Option<NodeId> {
        self.right_id
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_red(&self) -> bool {
        self.color == Color::Red
    }

    #[inline]
    pub(crate) fn child(&self, side: Side) -> Option<NodeId> {
        match side {
            Side::Left => self.left_id,
            Side::Right => self.right_id,
        }
    }

    #[inline]
    pub(crate) fn set_child(&mut self, side: Side, id: Option<NodeId>) {
        match side {
            Side::Left => self.left_id = id,
            Side::Right => self.right_id = id,
        }
    }

    /// The side on which `id` hangs below this node, if it is a child at all.
    #[inline]
    pub(crate) fn side_of(&self, id: NodeId) -> Option<Side> {
        if self.left_id == Some(id) {
            Some(Side::Left)
        } else if self.right_id == Some(id) {
            Some(Side::Right)
        } else {
            None
        }
    }
}

impl<K: Clone, V: Clone> Node<K, V> {
    /// Copies the record under a fresh id.
    #[inline]
    pub(crate) fn duplicate(&self) -> Self {
        Self {
            id: NodeId::generate(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Color, Node, NodeId, Side};

    #[test]
    fn test_wire_shape() {
        let mut node = Node::leaf("k".to_string(), 7);
        node.color = Color::Black;
        let child = NodeId::generate();
        node.set_child(Side::Right, Some(child));

        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(
            value,
            json!({
                "id": node.id.to_string(),
                "color": 1,
                "key": "k",
                "value": 7,
                "rightId": child.to_string(),
                "count": 1,
            })
        );

        let decoded: Node<String, i32> = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, node);
        assert_eq!(decoded.left_id, None);
    }

    #[test]
    fn test_invalid_color() {
        let raw = json!({
            "id": NodeId::generate().to_string(),
            "color": 2,
            "key": 1,
            "value": 1,
            "count": 1,
        });
        assert!(serde_json::from_value::<Node<i32, i32>>(raw).is_err());
    }

    #[test]
    fn test_duplicate_mints_new_id() {
        let node = Node::leaf(1, 1);
        let copy = node.duplicate();
        assert_ne!(copy.id, node.id);
        assert_eq!(copy.key, node.key);
        assert_eq!(copy.side_of(node.id), None);
    }
}
