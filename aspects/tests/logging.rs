use std::sync::Mutex;

use aspects::{Object, Reflect, TypeRegistry, Universe, Variant};
use log::{Level, LevelFilter, Log, Metadata, Record};

static RECORDS: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());

struct Capture;

impl Log for Capture {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        RECORDS
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

#[derive(Default, Reflect)]
#[reflect(slots(fire))]
struct Turret {
    shots: u32,
}
impl Turret {
    fn fire(&mut self, count: u32) {
        self.shots += count;
    }
}
impl Object for Turret {}

#[test]
fn rejected_slot_calls_are_warnings() {
    log::set_logger(&Capture).unwrap();
    log::set_max_level(LevelFilter::Trace);

    let mut registry = TypeRegistry::with_builtins();
    registry.register_class::<Turret>().unwrap();
    let mut universe = Universe::new(&registry);
    let turret = universe
        .create_object(registry.class_of::<Turret>().unwrap(), "Turret")
        .unwrap();

    RECORDS.lock().unwrap().clear();
    assert!(!universe.invoke(turret, "fire", &[Variant::new("twice".to_owned())]));
    assert!(universe.invoke(turret, "fire", &[Variant::new(2u32)]));
    assert_eq!(universe.get::<Turret>(turret).unwrap().shots, 2);

    let records = RECORDS.lock().unwrap();
    let slot: Vec<_> = records.iter().filter(|(_, text)| text.contains("fire")).collect();
    assert_eq!(slot.len(), 1, "{records:?}");
    assert_eq!(slot[0].0, Level::Warn);
    assert!(records.iter().all(|(level, _)| *level != Level::Error));
}
