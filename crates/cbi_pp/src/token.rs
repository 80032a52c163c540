use std::rc::Rc;

/// The kind of a preprocessing token, per `DATA MODEL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    StringLiteral,
    CharLiteral,
    Punctuator,
    /// Produced by `##` concatenation of an empty argument; vanishes on
    /// any further concatenation or is dropped at the end of rescan.
    Placemarker,
    Newline,
    Eof,
}

/// A preprocessing token: kind, original spelling, and the hide set that
/// guarantees macro rescan terminates.
///
/// `hide_set` only ever grows for a given token (`DATA MODEL` invariant);
/// it is cheap to extend because [`HideSet`] is a persistent linked set
/// rather than a cloned `HashSet`.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub spelling: String,
    pub hide_set: HideSet,
}

impl Token {
    pub fn new(kind: TokenKind, spelling: impl Into<String>) -> Self {
        Self { kind, spelling: spelling.into(), hide_set: HideSet::default() }
    }

    pub fn with_hide_set(kind: TokenKind, spelling: impl Into<String>, hide_set: HideSet) -> Self {
        Self { kind, spelling: spelling.into(), hide_set }
    }

    pub fn is_identifier(&self, name: &str) -> bool {
        self.kind == TokenKind::Identifier && self.spelling == name
    }

    pub fn is_punct(&self, spelling: &str) -> bool {
        self.kind == TokenKind::Punctuator && self.spelling == spelling
    }
}

/// A persistent (cons-list) set of macro names a token must not be
/// re-expanded against.
///
/// Represented as a linked list of `Rc` nodes rather than a cloned
/// `HashSet` so that handing every token in a macro's replacement list
/// the same enlarged hide set (`insert`) is O(1) share, not O(n) copy —
/// the pattern that makes wide macro expansions cheap.
#[derive(Debug, Clone, Default)]
pub struct HideSet(Option<Rc<Node>>);

#[derive(Debug)]
struct Node {
    name: String,
    parent: Option<Rc<Node>>,
}

impl HideSet {
    pub fn contains(&self, name: &str) -> bool {
        let mut cur = &self.0;
        while let Some(node) = cur {
            if node.name == name {
                return true;
            }
            cur = &node.parent;
        }
        false
    }

    /// Returns a new hide set with `name` added; `self` is unmodified
    /// (hide sets are append-only but token-local, never shared beyond
    /// the tokens that were given them).
    pub fn insert(&self, name: &str) -> HideSet {
        if self.contains(name) {
            return self.clone();
        }
        HideSet(Some(Rc::new(Node { name: name.to_string(), parent: self.0.clone() })))
    }

    fn iter(&self) -> impl Iterator<Item = &str> {
        std::iter::successors(self.0.as_deref(), |n| n.parent.as_deref()).map(|n| n.name.as_str())
    }

    /// Set intersection, used to compute the hide set of a function-like
    /// macro invocation: `(HS(name) ∩ HS(rparen)) ∪ {name}`.
    pub fn intersect(&self, other: &HideSet) -> HideSet {
        let mut result = HideSet::default();
        for name in self.iter() {
            if other.contains(name) {
                result = result.insert(name);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hide_set_insert_and_contains() {
        let hs = HideSet::default();
        assert!(!hs.contains("FOO"));
        let hs2 = hs.insert("FOO");
        assert!(hs2.contains("FOO"));
        assert!(!hs.contains("FOO"), "insert must not mutate the original");
    }

    #[test]
    fn hide_set_intersection() {
        let a = HideSet::default().insert("A").insert("B");
        let b = HideSet::default().insert("B").insert("C");
        let i = a.intersect(&b);
        assert!(i.contains("B"));
        assert!(!i.contains("A"));
        assert!(!i.contains("C"));
    }
}
