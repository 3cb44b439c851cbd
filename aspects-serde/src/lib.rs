//! serde support for `aspects` documents.
//!
//! [`ser::Tree`] and [`de::Tree`] move whole documents through any serde
//! format, [`de::Node`] reads serde types straight out of a node, and
//! [`Serde`] makes serde types usable as reflected values.

mod bridge;
pub mod de;
pub mod ser;

pub use bridge::{Serde, from_node, to_document, write_node};

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(PartialEq, Debug, Serialize, Deserialize)]
    enum Stance {
        Standing,
        Crouched { depth: f32 },
        Prone(u8),
    }

    #[derive(PartialEq, Debug, Serialize, Deserialize)]
    struct Squad {
        callsign: String,
        stance: Stance,
        hidden: bool,
        members: Vec<(String, u64)>,
        leader: Option<String>,
    }

    fn squad() -> Squad {
        Squad {
            callsign: "Bravo".to_owned(),
            stance: Stance::Crouched { depth: 0.5 },
            hidden: true,
            members: vec![("Ivy".to_owned(), 7), ("Rook".to_owned(), u64::MAX)],
            leader: None,
        }
    }

    #[test]
    fn squads_survive_the_document() {
        let document = to_document(&squad()).unwrap();
        let root = document.root();
        assert_eq!(root.get("hidden").as_int(), Some(1));
        assert_eq!(root.get("members").at(1).at(1).as_str(), Some("18446744073709551615"));
        assert!(root.get("leader").is_empty());
        assert_eq!(from_node::<Squad>(root).unwrap(), squad());

        for stance in [Stance::Standing, Stance::Prone(2)] {
            let document = to_document(&stance).unwrap();
            assert_eq!(from_node::<Stance>(document.root()).unwrap(), stance);
        }
    }

    #[test]
    fn documents_pass_through_json() {
        let document = to_document(&squad()).unwrap();
        let json = serde_json::to_string(&ser::Tree(document.root())).unwrap();
        let again = serde_json::from_str::<de::Tree>(&json).unwrap().0;
        assert_eq!(document, again);

        let roster = BTreeMap::from([("alpha".to_owned(), 3), ("bravo".to_owned(), 4)]);
        let document = to_document(&roster).unwrap();
        assert_eq!(from_node::<BTreeMap<String, i32>>(document.root()).unwrap(), roster);
    }

    #[test]
    fn sequences_leave_no_spare_nodes() {
        let tree = serde_json::from_str::<de::Tree>("[1, [2, 3], []]").unwrap().0;
        // root, three items and two nested ones
        assert_eq!(tree.allocated(), 6);
        assert_eq!(tree.root().at(1).at(1).as_int(), Some(3));
    }

    #[test]
    fn mismatches_are_errors() {
        let mut document = aspects::Document::new();
        document.root_mut().entry("hidden").set_str("maybe");
        assert!(from_node::<Squad>(document.root()).is_err());
        assert!(from_node::<bool>(document.root().get("hidden")).is_err());
        assert!(from_node::<Stance>(document.root()).is_err());
    }
}
