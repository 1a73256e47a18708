#![no_std]
#![no_main]

/// modules
use lasercam::config::*;
use lasercam::err::{err_aim_h, err_os_h, err_pwm_h, err_session_h, err_usb_h, log_err, RticErr};
use lasercam::leds::StatusLeds;
use lasercam::pwm::{PwmError, ServoBoard};
use lasercam::storage::FlashPresets;
use lasercam::xfer_protoc::{Xfer, XferError};
use lasercam::{now_ms, Mono};

/// configuration
use defmt_rtt as _;
use panic_probe as _;

/// hal
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use stm32f4xx_hal::prelude::*;
use stm32f4xx_hal::{gpio, i2c::I2c1, pac, spi};
use w25q::W25Q;

/// common
use lasercam_common::msg::MAX_REQUEST_LEN;
use lasercam_common::watchdog::IdleWatchdog;
use lasercam_common::{AimConfig, AimController, Command, Effect, Outcome, Reply, Request, Session};

/// type
type SpiFlash = W25Q<
    ExclusiveDevice<spi::Spi<pac::SPI1>, gpio::Pin<'A', 4, gpio::Output>, NoDelay>,
    stm32f4xx_hal::timer::Delay<pac::TIM2, 1000>,
>;

/// Servo power gate, active low.
type GatePin = gpio::PC3<gpio::Output>;
type LaserPin = gpio::PC4<gpio::Output>;
type CameraLedPin = gpio::PC5<gpio::Output>;

type Aim = AimController<ServoBoard<I2c1>, GatePin, LaserPin>;

#[rtic::app(device = stm32f4xx_hal::pac, peripherals = true, dispatchers = [USART1, USART2, SPI4])]
mod app {

    use defmt::{debug, info, warn};
    use rtic::Mutex;
    use rtic_monotonics::Monotonic;
    use stm32f4xx_hal::gpio::PinState;
    use stm32f4xx_hal::otg_fs;
    use usb_device::class_prelude::UsbBusAllocator;

    use super::*;

    #[shared]
    struct Shared {
        aim: Aim,
        watchdog: IdleWatchdog,
        leds: StatusLeds,
        streaming: bool,
        /// Bumped on every `Open`; a pending gate-off only fires if no new
        /// session started in the meantime.
        sessions: u32,
    }

    #[local]
    struct Local {
        xfer: Xfer,
        session: Session,
        presets: FlashPresets<SpiFlash>,
        camera_led: CameraLedPin,
    }

    #[init(local = [
        ep_memory: [u32; 1024] = [0; 1024],
        usb_bus: Option<UsbBusAllocator<otg_fs::UsbBusType>> = None,
    ])]
    fn init(cx: init::Context) -> (Shared, Local) {
        let dp = cx.device;
        let rcc = dp.RCC.constrain();
        let hse = HSE_MHZ.MHz();
        let sysclk = SYSCLK_MHZ.MHz();
        let clocks = rcc
            .cfgr
            .use_hse(hse)
            .sysclk(sysclk)
            .require_pll48clk()
            .freeze();

        let _syscfg = dp.SYSCFG.constrain();
        Mono::start(cx.core.SYST, sysclk.to_Hz());

        let gpioa = dp.GPIOA.split();
        let gpiob = dp.GPIOB.split();
        let gpioc = dp.GPIOC.split();

        // Outputs come up in their safe state: servos unpowered, laser off
        let gate = gpioc.pc3.into_push_pull_output_in_state(PinState::High);
        let laser = gpioc.pc4.into_push_pull_output_in_state(PinState::Low);
        let camera_led = gpioc.pc5.into_push_pull_output_in_state(PinState::Low);

        let mut leds = StatusLeds::new(
            gpiob.pb12.into_push_pull_output().erase(),
            gpiob.pb13.into_push_pull_output().erase(),
            gpiob.pb14.into_push_pull_output().erase(),
        );

        // PCA9685
        let i2c1_scl = gpiob.pb8.into_alternate_open_drain();
        let i2c1_sda = gpiob.pb9.into_alternate_open_drain();
        let i2c1 = I2c1::new(dp.I2C1, (i2c1_scl, i2c1_sda), I2C_KHZ.kHz(), &clocks);
        let board = match ServoBoard::new(i2c1) {
            Ok(board) => board,
            Err(e) => {
                log_err(err_pwm_h(PwmError::Pca(e)));
                defmt::panic!("PCA9685 did not respond");
            }
        };
        let aim = AimController::new(board, gate, laser, AimConfig::new(SERVO_RANGE));
        // PCA9685

        // SPI Flash
        let spi1 = dp.SPI1.spi(
            (
                gpioa.pa5.into_alternate(),
                gpioa.pa6.into_alternate(),
                gpioa.pa7.into_alternate(),
            ),
            embedded_hal::spi::MODE_0,
            FLASH_SPI_MHZ.MHz(),
            &clocks,
        );
        let cs = gpioa.pa4.into_push_pull_output();
        let spidev = match ExclusiveDevice::new_no_delay(spi1, cs) {
            Ok(dev) => dev,
            Err(_) => defmt::panic!("flash chip select"),
        };
        let mem = W25Q::new_with_spi(spidev, dp.TIM2.delay_ms(&clocks));
        let presets = FlashPresets::new(mem, PRESET_ADDR);
        // SPI Flash

        // USB
        let usb = otg_fs::USB {
            usb_global: dp.OTG_FS_GLOBAL,
            usb_device: dp.OTG_FS_DEVICE,
            usb_pwrclk: dp.OTG_FS_PWRCLK,
            pin_dm: gpio::alt::otg_fs::Dm::PA11(gpioa.pa11.into_alternate()),
            pin_dp: gpio::alt::otg_fs::Dp::PA12(gpioa.pa12.into_alternate()),
            hclk: clocks.hclk(),
        };
        let xfer = match lasercam::usb::usb_setup(usb, cx.local.usb_bus, cx.local.ep_memory) {
            Some(xfer) => xfer,
            None => defmt::panic!("usb string descriptors rejected"),
        };
        // USB

        for spawned in [usb_task::spawn(), watchdog_task::spawn(), blink_task::spawn()] {
            if spawned.is_err() {
                log_err(err_os_h(RticErr::SpawnFail));
            }
        }

        leds.set_running(true);
        info!("lasercam up");

        (
            Shared {
                aim,
                watchdog: IdleWatchdog::new(IDLE_TIMEOUT_MS, now_ms()),
                leds,
                streaming: false,
                sessions: 0,
            },
            Local {
                xfer,
                session: Session::new(),
                presets,
                camera_led,
            },
        )
    }

    /// Serves host requests one at a time: receive, act, reply.
    #[task(priority = 1, shared = [aim, watchdog, leds, streaming, sessions], local = [xfer, session, presets, camera_led])]
    async fn usb_task(mut cx: usb_task::Context) {
        let mut request = [0u8; MAX_REQUEST_LEN];
        loop {
            let n = match cx.local.xfer.receive(&mut request).await {
                Ok(n) => n,
                Err(XferError::Usb(e)) => {
                    log_err(err_usb_h(e));
                    Mono::delay(10.millis()).await;
                    continue;
                }
                Err(e) => {
                    warn!("receive failed: {}", e);
                    Mono::delay(10.millis()).await;
                    continue;
                }
            };
            let now = now_ms();
            cx.shared.watchdog.lock(|wd| wd.feed(now));

            let decoded = Request::decode(&request[..n]);
            let closing = matches!(decoded, Ok(Request::Close));
            let reply = match decoded {
                Ok(Request::Open) => open(&mut cx),
                Ok(Request::Close) => close(&mut cx),
                Ok(Request::Remote(text)) => remote(&mut cx, text),
                Err(e) => {
                    warn!("bad request: {}", e);
                    Reply::Ignored
                }
            };

            if let Err(e) = cx.local.xfer.send(&reply.to_bytes()).await {
                warn!("reply {} lost: {}", reply, e);
            }

            // the host already has its answer; the gate goes off once the
            // servos have reached home
            if closing {
                let session = cx.shared.sessions.lock(|s| *s);
                if gate_off_task::spawn(session).is_err() {
                    log_err(err_os_h(RticErr::SpawnFail));
                    if let Err(e) = cx.shared.aim.lock(|aim| aim.set_power(false, false)) {
                        log_err(err_aim_h(e));
                    }
                }
            }
        }
    }

    fn open(cx: &mut usb_task::Context<'_>) -> Reply {
        let session = &mut *cx.local.session;
        let presets = &mut *cx.local.presets;
        let opened = cx.shared.aim.lock(|aim| session.open(aim, presets));
        cx.shared.leds.lock(|leds| leds.set_connected(true));
        cx.shared.sessions.lock(|s| *s = s.wrapping_add(1));
        match opened {
            Ok(()) => {
                info!("session open");
                Reply::Done
            }
            Err(e) => {
                log_err(err_session_h(e));
                Reply::Fault
            }
        }
    }

    fn close(cx: &mut usb_task::Context<'_>) -> Reply {
        let session = &mut *cx.local.session;
        let presets = &mut *cx.local.presets;
        let parked = cx.shared.aim.lock(|aim| session.close(aim, presets));

        cx.shared.streaming.lock(|s| *s = false);
        cx.local.camera_led.set_low();
        cx.shared.leds.lock(|leds| {
            leds.set_connected(false);
            leds.set_stream(false);
        });

        info!("session closed");
        match parked {
            Ok(()) => Reply::Done,
            Err(e) => {
                log_err(err_session_h(e));
                Reply::Fault
            }
        }
    }

    /// Switches servo power off after a `Close`, unless the host opened a
    /// new session while the servos were still travelling home.
    #[task(priority = 1, shared = [aim, sessions])]
    async fn gate_off_task(mut cx: gate_off_task::Context, closed: u32) {
        Mono::delay(PARK_SETTLE_MS.millis()).await;
        if cx.shared.sessions.lock(|s| *s) != closed {
            debug!("reopened before the servos settled, power stays on");
            return;
        }
        if let Err(e) = cx.shared.aim.lock(|aim| aim.set_power(false, false)) {
            log_err(err_aim_h(e));
        }
    }

    fn remote(cx: &mut usb_task::Context<'_>, text: &str) -> Reply {
        let command = Command::parse(text);
        let session = &mut *cx.local.session;
        let handled = cx.shared.aim.lock(|aim| session.handle(aim, &command));
        match handled {
            Ok(Outcome::Done) => {
                debug!("{}", command);
                Reply::Done
            }
            Ok(Outcome::Ignored) => {
                info!("unknown command: {}", text);
                Reply::Ignored
            }
            Ok(Outcome::Effect(effect)) => {
                apply(cx, effect);
                Reply::from(Outcome::Effect(effect))
            }
            Err(e) => {
                log_err(err_aim_h(e));
                Reply::Fault
            }
        }
    }

    // The parts of an effect that live on the board. Speech and the stream
    // process itself are run by the host.
    fn apply(cx: &mut usb_task::Context<'_>, effect: Effect) {
        match effect {
            Effect::Stream(on) => {
                cx.shared.streaming.lock(|s| *s = on);
                if !on {
                    cx.shared.leds.lock(|leds| leds.set_stream(false));
                }
            }
            Effect::CameraLed(on) => cx.local.camera_led.set_state(on.into()),
            Effect::Speak(n) => debug!("phrase {}", n),
        }
    }

    /// Cuts servo power after a long stretch without requests.
    #[task(priority = 1, shared = [aim, watchdog])]
    async fn watchdog_task(mut cx: watchdog_task::Context) {
        let mut next = Mono::now();
        loop {
            next += WATCHDOG_PERIOD_MS.millis();
            Mono::delay_until(next).await;

            let now = now_ms();
            if cx.shared.watchdog.lock(|wd| wd.poll(now)) {
                warn!("idle for {} s, servo power off", IDLE_TIMEOUT_MS / 1000);
                if let Err(e) = cx.shared.aim.lock(|aim| aim.set_power(false, false)) {
                    log_err(err_aim_h(e));
                }
            }
        }
    }

    #[task(priority = 1, shared = [leds, streaming])]
    async fn blink_task(mut cx: blink_task::Context) {
        let mut next = Mono::now();
        loop {
            let streaming = cx.shared.streaming.lock(|s| *s);
            cx.shared.leds.lock(|leds| {
                if streaming {
                    leds.toggle_stream();
                }
            });
            next += BLINK_PERIOD_MS.millis();
            Mono::delay_until(next).await;
        }
    }
}
