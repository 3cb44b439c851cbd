use std::collections::BTreeMap;

use aspects::{Codec, Object, Reflect, TypeRegistry, Universe, YamlCodec};
use aspects_serde::{Serde, from_node, to_document};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Loadout {
    weapon: String,
    ammo: BTreeMap<String, u32>,
    scale: f64,
    silenced: bool,
}

#[derive(Default, Reflect)]
struct Soldier {
    rank: i32,
    loadout: Serde<Loadout>,
}
impl Object for Soldier {}

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn loadout() -> Loadout {
    Loadout {
        weapon: "rifle".to_owned(),
        ammo: BTreeMap::from([("rounds".to_owned(), 120), ("grenades".to_owned(), 2)]),
        scale: 1.5,
        silenced: true,
    }
}

#[test]
fn serde_values_are_plain_nodes() {
    init();
    let document = to_document(&loadout()).unwrap();
    let root = document.root();
    assert_eq!(root.get("weapon").as_str(), Some("rifle"));
    assert_eq!(root.get("ammo").get("rounds").as_int(), Some(120));
    assert_eq!(root.get("scale").as_float(), Some(1.5));
    assert_eq!(root.get("silenced").as_int(), Some(1));
    assert_eq!(from_node::<Loadout>(root).unwrap(), loadout());
}

#[test]
fn serde_fields_survive_a_universe_roundtrip() {
    init();
    let mut registry = TypeRegistry::with_builtins();
    registry.register_class::<Soldier>().unwrap();

    let mut universe = Universe::new(&registry);
    let soldier = universe
        .create_object(registry.class_of::<Soldier>().unwrap(), "Sarge")
        .unwrap();
    {
        let soldier = universe.get_mut::<Soldier>(soldier).unwrap();
        soldier.rank = 3;
        soldier.loadout = Serde(loadout());
    }

    let bytes = YamlCodec.to_bytes(&universe.serialize()).unwrap();
    let document = YamlCodec.from_bytes(&bytes).unwrap();

    let mut restored = Universe::new(&registry);
    let handles = restored.deserialize(&document).unwrap();
    assert_eq!(handles.len(), 1);
    assert_eq!(restored.get_id(handles[0]), "Sarge");
    let copy = restored.get::<Soldier>(handles[0]).unwrap();
    assert_eq!(copy.rank, 3);
    assert_eq!(*copy.loadout, loadout());
    let rank = restored.get_attribute(handles[0], "rank").unwrap();
    assert_eq!(rank.get::<i32>(), Some(3));
}

#[test]
fn mismatched_nodes_keep_the_old_value() {
    init();
    let mut registry = TypeRegistry::with_builtins();
    registry.register_class::<Soldier>().unwrap();

    let document = YamlCodec
        .from_bytes(b"objects:\n  - class: Soldier\n    id: Rookie\n    rank: 1\n    loadout: [1, 2]\n")
        .unwrap();
    let mut universe = Universe::new(&registry);
    let handles = universe.deserialize(&document).unwrap();
    let soldier = universe.get::<Soldier>(handles[0]).unwrap();
    assert_eq!(soldier.rank, 1);
    assert_eq!(*soldier.loadout, Loadout::default());
}
