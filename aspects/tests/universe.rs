use aspects::{
    Codec, CompositeType, Object, ObjectType, Reflect, StructuredType, TypeRegistry, Universe, YamlCodec,
};

#[derive(Default, Reflect)]
struct Comp {
    label: String,
}
impl Object for Comp {}

#[derive(Default, Reflect)]
struct Foo {
    a: i64,
    b: f64,
}
impl Object for Foo {}

#[derive(Default, Reflect)]
struct Bar {
    flag: bool,
}
impl Object for Bar {}

#[derive(Default, Reflect)]
struct Baz {
    #[reflect(extends)]
    bar: Bar,
    extra: u16,
}
impl Object for Baz {}

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::with_builtins();
    registry.register_class::<Comp>().unwrap();
    registry.register_class::<Foo>().unwrap();
    registry.register_class::<Bar>().unwrap();
    registry.register_class::<Baz>().unwrap();
    registry
}

const COMPOSITE: &str = "
objects:
  - class: Comp
    id: X
    label: first
    aspects:
      - class: Foo
        a: 7
      - class: Bar
        flag: 1
";

#[test]
fn composite_from_yaml() {
    init();
    let registry = registry();
    let mut universe = Universe::new(&registry);
    let document = YamlCodec.from_bytes(COMPOSITE.as_bytes()).unwrap();
    let handles = universe.deserialize(&document).unwrap();
    assert_eq!(handles.len(), 1);
    let x = universe.get_object("X").unwrap();
    assert_eq!(x, handles[0]);

    let sizes = [
        registry.class_of::<Comp>().unwrap().size(),
        registry.class_of::<Foo>().unwrap().size(),
        registry.class_of::<Bar>().unwrap().size(),
    ];
    let ty = universe.header(x).unwrap().object_type().clone();
    assert_eq!(ty.size(), sizes.iter().sum::<usize>());
    let composite = ty.as_composite().unwrap();
    assert_eq!(composite.aspect_offset(0), Some(sizes[0]));
    assert_eq!(composite.aspect_offset(1), Some(sizes[0] + sizes[1]));

    let foo = universe.aspect_cast(x, registry.class_of::<Foo>().unwrap()).unwrap();
    let bar = universe.aspect_cast(x, registry.class_of::<Bar>().unwrap()).unwrap();
    assert_eq!(universe.find_parent(foo), Some(x));
    assert_eq!(universe.header(bar).unwrap().offset(), sizes[0] + sizes[1]);
    assert_eq!(universe.get::<Foo>(foo).unwrap().a, 7);
    assert!(universe.get::<Bar>(bar).unwrap().flag);
    assert_eq!(universe.get::<Comp>(x).unwrap().label, "first");

    // sideways between the aspects
    assert_eq!(universe.aspect_cast(foo, registry.class_of::<Bar>().unwrap()), Some(bar));
    assert_eq!(universe.aspect_cast(bar, registry.class_of::<Comp>().unwrap()), Some(x));

    let written = universe.serialize();
    let object = written.root().get("objects").at(0);
    assert_eq!(object.get("class").as_str(), Some("Comp"));
    assert_eq!(object.get("id").as_str(), Some("X"));
    let aspects = object.get("aspects");
    assert_eq!(aspects.at(0).get("class").as_str(), Some("Foo"));
    assert_eq!(aspects.at(0).get("a").as_int(), Some(7));
    assert_eq!(aspects.at(1).get("class").as_str(), Some("Bar"));
    assert_eq!(aspects.at(1).get("flag").as_int(), Some(1));

    let text = YamlCodec.to_bytes(&written).unwrap();
    let mut again = Universe::new(&registry);
    again.deserialize(&YamlCodec.from_bytes(&text).unwrap()).unwrap();
    assert_eq!(again.serialize(), written);
}

#[test]
fn ids_stay_unique() {
    init();
    let registry = registry();
    let mut universe = Universe::new(&registry);
    let foo = registry.class_of::<Foo>().unwrap();

    let ids: Vec<String> = ["Thing", "Thing", "Thing", "", "x", "Part9", "Part9"]
        .into_iter()
        .map(|id| {
            let handle = universe.create_object(foo, id).unwrap();
            universe.get_id(handle).to_owned()
        })
        .collect();
    assert_eq!(ids, ["Thing", "Thing01", "Thing02", "Foo01", "Foo02", "Part9", "Part09"]);

    let thing = universe.get_object("Thing").unwrap();
    assert!(universe.rename_object(thing, "Renamed"));
    assert!(universe.get_object("Thing").is_none());
    assert!(!universe.rename_object(thing, "Thing01"));
    assert_eq!(universe.get_id(thing), "Thing03");
    assert_eq!(universe.len(), 7);
}

/// Comp[Foo, Baz], Baz extending Bar.
fn composite(registry: &TypeRegistry) -> ObjectType {
    let mut composite = CompositeType::new("Rig", registry.class_of::<Comp>().unwrap());
    composite.add_aspect(registry.class_of::<Foo>().unwrap()).unwrap();
    composite.add_aspect(registry.class_of::<Baz>().unwrap()).unwrap();
    composite.freeze();
    ObjectType::composite(composite).unwrap()
}

#[test]
fn casts() {
    init();
    let registry = registry();
    let mut universe = Universe::new(&registry);
    let rig = universe.create_object(composite(&registry), "Rig").unwrap();
    let lone = universe.create_object(registry.class_of::<Bar>().unwrap(), "Lone").unwrap();
    let foo = universe.aspects(rig)[0];
    let baz = universe.aspects(rig)[1];

    let class = |name: &str| registry.class_named(name).unwrap();
    let table = [
        (rig, "Comp", Some(rig)),
        (rig, "Foo", Some(foo)),
        (rig, "Bar", Some(baz)),
        (foo, "Baz", Some(baz)),
        (foo, "Bar", Some(baz)),
        (baz, "Foo", Some(foo)),
        (baz, "Comp", Some(rig)),
        (lone, "Bar", Some(lone)),
        (lone, "Baz", None),
        (lone, "Foo", None),
    ];
    for (from, target, expected) in table {
        assert_eq!(universe.aspect_cast(from, class(target)), expected, "{target} from {from:?}");
    }

    universe.cast_mut::<Bar>(foo).unwrap().flag = true;
    assert!(universe.get::<Baz>(baz).unwrap().bar.flag);

    universe.clear();
    assert!(universe.is_empty());
    assert_eq!(universe.aspect_cast(foo, class("Bar")), None);
}
