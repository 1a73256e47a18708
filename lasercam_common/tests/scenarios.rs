//! Whole-session behaviour driven through the command table, the way the
//! firmware drives it.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, OutputPin};
use lasercam_common::msg::{Reply, Request};
use lasercam_common::preset::PresetStorage;
use lasercam_common::{
    AimConfig, AimController, Axis, Command, Position, PresetStore, PwmOutput, ServoRange,
    Session,
};

/// Records channel writes into a log the test keeps a handle to.
#[derive(Clone, Default)]
struct SharedPwm(Rc<RefCell<Vec<(u8, u16)>>>);

impl PwmOutput for SharedPwm {
    type Error = Infallible;

    fn set_pulse(&mut self, channel: u8, pulse: u16) -> Result<(), Infallible> {
        self.0.borrow_mut().push((channel, pulse));
        Ok(())
    }
}

#[derive(Clone, Default)]
struct SharedPin(Rc<RefCell<bool>>);

impl SharedPin {
    fn high() -> Self {
        Self(Rc::new(RefCell::new(true)))
    }

    fn is_high(&self) -> bool {
        *self.0.borrow()
    }
}

impl ErrorType for SharedPin {
    type Error = Infallible;
}

impl OutputPin for SharedPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        *self.0.borrow_mut() = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        *self.0.borrow_mut() = true;
        Ok(())
    }
}

/// Keeps the blob the way flash would.
#[derive(Default)]
struct BlobStorage {
    blob: Option<Vec<u8>>,
}

impl PresetStorage for BlobStorage {
    type Error = Infallible;

    fn load(&mut self) -> Result<Option<PresetStore>, Infallible> {
        Ok(self.blob.as_deref().and_then(PresetStore::from_bytes))
    }

    fn save(&mut self, store: &PresetStore) -> Result<(), Infallible> {
        self.blob = Some(store.to_bytes().to_vec());
        Ok(())
    }
}

struct Rig {
    aim: AimController<SharedPwm, SharedPin, SharedPin>,
    session: Session,
    writes: SharedPwm,
    gate: SharedPin,
    laser: SharedPin,
}

impl Rig {
    fn new(range: ServoRange) -> Self {
        let writes = SharedPwm::default();
        let gate = SharedPin::high();
        let laser = SharedPin::default();
        let aim = AimController::new(
            writes.clone(),
            gate.clone(),
            laser.clone(),
            AimConfig::new(range),
        );
        Self {
            aim,
            session: Session::new(),
            writes,
            gate,
            laser,
        }
    }

    /// Feed one request payload through, as the firmware command task does.
    fn request(&mut self, storage: &mut BlobStorage, payload: &[u8]) -> Reply {
        match Request::decode(payload) {
            Ok(Request::Open) => {
                self.session.open(&mut self.aim, storage).unwrap();
                Reply::Done
            }
            Ok(Request::Close) => {
                self.session.close(&mut self.aim, storage).unwrap();
                Reply::Done
            }
            Ok(Request::Remote(text)) => match self.session.handle(&mut self.aim, &Command::parse(text)) {
                Ok(outcome) => outcome.into(),
                Err(_) => Reply::Fault,
            },
            Err(_) => Reply::Ignored,
        }
    }

    fn send(&mut self, text: &str) -> Reply {
        self.session
            .handle(&mut self.aim, &Command::parse(text))
            .unwrap()
            .into()
    }
}

#[test]
fn saturating_moves_and_preset_recall() {
    let mut rig = Rig::new(ServoRange::full());
    assert_eq!(rig.aim.position(Axis::Laser), Position::new(365, 365));

    for _ in 0..3 {
        rig.send("LL");
    }
    assert_eq!(rig.aim.position(Axis::Laser).x, 335);

    rig.send("L!");
    rig.send("L1");
    for _ in 0..20 {
        rig.send("LL");
    }
    assert_eq!(rig.aim.position(Axis::Laser).x, 130);

    rig.send("L1");
    assert_eq!(rig.aim.position(Axis::Laser), Position::new(335, 365));
    assert_eq!(rig.writes.0.borrow().last(), Some(&(3, 365)));
}

#[test]
fn absolute_targets_saturate_per_coordinate() {
    let mut rig = Rig::new(ServoRange::full());
    rig.aim.set_position(Axis::Camera, 9999, -50).unwrap();
    assert_eq!(rig.aim.position(Axis::Camera), Position::new(600, 130));
    assert_eq!(rig.aim.clamp_events(), 2);
}

#[test]
fn unknown_command_changes_nothing() {
    let mut rig = Rig::new(ServoRange::default());
    rig.send("CR");
    rig.send("C!");
    rig.send("C2");
    rig.send("LN");
    rig.send("L!");
    let before_writes = rig.writes.0.borrow().len();
    let snapshot = |rig: &Rig| {
        (
            rig.aim.position(Axis::Laser),
            rig.aim.position(Axis::Camera),
            rig.aim.power_state(),
            rig.aim.is_laser_enabled(),
            *rig.aim.presets(),
            rig.session,
        )
    };
    let before = snapshot(&rig);
    assert!(rig.session.is_armed(Axis::Laser));

    assert_eq!(rig.send("ZZ"), Reply::Ignored);

    assert_eq!(snapshot(&rig), before);
    assert_eq!(rig.writes.0.borrow().len(), before_writes);
    // the arm flag survived and still turns the next slot into a store
    rig.send("L4");
    assert_eq!(
        rig.aim.presets().laser.get(3),
        Some(rig.aim.position(Axis::Laser))
    );
}

#[test]
fn power_cycle_recommits_without_drift() {
    let mut rig = Rig::new(ServoRange::full());
    rig.aim.set_position(Axis::Laser, 300, 400).unwrap();
    rig.aim.set_power(false, false).unwrap();
    assert!(rig.gate.is_high());

    rig.writes.0.borrow_mut().clear();
    rig.aim.set_power(true, true).unwrap();
    assert!(!rig.gate.is_high());
    assert_eq!(
        *rig.writes.0.borrow(),
        vec![(2, 300), (3, 400), (0, 365), (1, 365)]
    );
    assert_eq!(rig.aim.position(Axis::Laser), Position::new(300, 400));
}

#[test]
fn presets_survive_a_reconnect() {
    let mut storage = BlobStorage::default();
    let mut rig = Rig::new(ServoRange::full());

    assert_eq!(rig.request(&mut storage, &[0x01]), Reply::Done);
    assert!(!rig.gate.is_high());
    for text in ["CD", "CD", "C!", "C3", "LN"] {
        let mut buf = [0u8; lasercam_common::msg::MAX_REQUEST_LEN];
        let n = Request::Remote(text).encode(&mut buf).unwrap();
        assert_eq!(rig.request(&mut storage, &buf[..n]), Reply::Done, "{}", text);
    }
    assert!(rig.laser.is_high());
    assert_eq!(rig.request(&mut storage, &[0x02]), Reply::Done);
    assert!(!rig.laser.is_high());
    assert_eq!(rig.aim.position(Axis::Camera), Position::new(365, 365));

    // a fresh device boot with the same flash
    let mut rig = Rig::new(ServoRange::full());
    rig.request(&mut storage, &[0x01]);
    assert_eq!(rig.send("C3"), Reply::Done);
    assert_eq!(rig.aim.position(Axis::Camera), Position::new(365, 385));
}

#[test]
fn effects_reach_the_reply() {
    let mut rig = Rig::new(ServoRange::default());
    assert_eq!(rig.send("CN"), Reply::Stream(true));
    assert_eq!(rig.send("co"), Reply::Stream(false));
    assert_eq!(rig.send("S1"), Reply::Speak(1));
    assert_eq!(rig.send("QN"), Reply::CameraLed(true));
}
