//! Diagnostic runner
//!
//! Tests, in order:
//!
//! | Test            | Operation                                  | Verdict                                   |
//! |-----------------|--------------------------------------------|-------------------------------------------|
//! | `board`         | describe profile                           | INFO                                      |
//! | `pin_<label>`   | drive LOW then HIGH, read back             | FAIL `stuck HIGH` / `stuck LOW`, else PASS |
//! | `servo_sweep`   | center, left, right, center; 400 ms each   | INFO per waypoint, then PASS              |
//! | `motor_ramp`    | 0, 25, 50, 75, 100 %, brake; 300 ms each   | WARN `no load` / PASS, or INFO if no sense |
//! | `analog_<label>`| 8 samples, 5 ms apart                      | FAIL/WARN on thresholds, WARN `noisy`      |
//!
//! A failing test never stops the suite. Outputs end at neutral.

use core::fmt::Write;

use embedded_hal_async::delay::DelayNs;
use heapless::{String, Vec};
use rcbridge_hal::{AnalogInput, UartTx};
use rcbridge_protocol::command::truncate;
use rcbridge_protocol::report::{MAX_DETAIL_LEN, MAX_TEST_NAME_LEN};
use rcbridge_protocol::{DiagStatus, DiagnosticEntry, ReportSummary};

use super::rig::{AnalogProbe, DiagnosticRig, LoopbackProbe};
use crate::actuator::{ActuatorMapper, ThrottleSignal};

/// Most entries kept in a [`DiagnosticReport`]; later entries are still
/// written to serial
pub const MAX_ENTRIES: usize = 32;

/// Normalized steering waypoints
const SWEEP_WAYPOINTS: [f32; 4] = [0.0, -1.0, 1.0, 0.0];
const SWEEP_DWELL_MS: u32 = 400;

/// Throttle steps, before the final brake step
const RAMP_STEPS: [f32; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];
const RAMP_DWELL_MS: u32 = 300;

/// Full-throttle current must exceed idle by more than this many counts
const NO_LOAD_MARGIN: u16 = 20;

const ANALOG_SAMPLES: usize = 8;
const ANALOG_INTERVAL_MS: u32 = 5;

/// Settling time between driving a loopback output and reading it back
const PIN_SETTLE_US: u32 = 100;

type Name = String<MAX_TEST_NAME_LEN>;
type Detail = String<MAX_DETAIL_LEN>;

/// Result of one run
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    pub entries: Vec<DiagnosticEntry, MAX_ENTRIES>,
    pub summary: ReportSummary,
}

impl DiagnosticReport {
    pub fn find(&self, test_name: &str) -> impl Iterator<Item = &DiagnosticEntry> + '_ {
        let name: Name = truncate(test_name);
        self.entries.iter().filter(move |e| e.test_name == name)
    }
}

/// Runs the diagnostic suite against a rig
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticRunner {
    mapper: ActuatorMapper,
}

impl DiagnosticRunner {
    pub fn new(mapper: ActuatorMapper) -> Self {
        Self { mapper }
    }

    /// Run every test once and write the framed report to `out`
    pub async fn run<D, U>(
        &self,
        rig: &mut DiagnosticRig<'_, '_>,
        delay: &mut D,
        out: &mut U,
    ) -> DiagnosticReport
    where
        D: DelayNs + ?Sized,
        U: UartTx + ?Sized,
    {
        log_info!("diagnostics starting");
        let mut session = Session {
            out,
            report: DiagnosticReport::default(),
        };
        session.line(rcbridge_protocol::report::DIAG_START);

        self.board(rig.board, &mut session);
        for probe in rig.loopbacks.iter_mut() {
            self.loopback(probe, delay, &mut session).await;
        }
        self.servo_sweep(rig, delay, &mut session).await;
        self.motor_ramp(rig, delay, &mut session).await;
        for probe in rig.analog.iter_mut() {
            self.analog(probe, delay, &mut session).await;
        }

        rig.steering.set_pulse_us(self.mapper.steering_center(0));
        rig.throttle
            .apply(ThrottleSignal::neutral(&self.mapper.profile().throttle));

        session.line(rcbridge_protocol::report::DIAG_END);
        log_info!(
            "diagnostics done: {} pass, {} fail, {} warn",
            session.report.summary.pass,
            session.report.summary.fail,
            session.report.summary.warn
        );
        session.report
    }

    fn board<U: UartTx + ?Sized>(&self, board: &str, session: &mut Session<'_, U>) {
        let profile = self.mapper.profile();
        let mut detail = Detail::new();
        let _ = write!(
            detail,
            "{} throttle={} steering={}-{}-{}us",
            board,
            profile.throttle.name(),
            profile.steering.min_us,
            profile.steering.center_us,
            profile.steering.max_us
        );
        session.emit("board", DiagStatus::Info, &detail);
    }

    async fn loopback<D, U>(
        &self,
        probe: &mut LoopbackProbe<'_>,
        delay: &mut D,
        session: &mut Session<'_, U>,
    ) where
        D: DelayNs + ?Sized,
        U: UartTx + ?Sized,
    {
        let mut name = Name::new();
        let _ = write!(name, "pin_{}", probe.label);

        probe.output.set_low();
        delay.delay_us(PIN_SETTLE_US).await;
        let stuck_high = probe.input.is_high();

        probe.output.set_high();
        delay.delay_us(PIN_SETTLE_US).await;
        let stuck_low = probe.input.is_low();

        probe.output.set_low();

        if stuck_high {
            session.emit(&name, DiagStatus::Fail, "stuck HIGH");
        } else if stuck_low {
            session.emit(&name, DiagStatus::Fail, "stuck LOW");
        } else {
            session.emit(&name, DiagStatus::Pass, "loopback ok");
        }
    }

    async fn servo_sweep<D, U>(
        &self,
        rig: &mut DiagnosticRig<'_, '_>,
        delay: &mut D,
        session: &mut Session<'_, U>,
    ) where
        D: DelayNs + ?Sized,
        U: UartTx + ?Sized,
    {
        for waypoint in SWEEP_WAYPOINTS {
            let pulse = self.mapper.map_steering(waypoint, 0);
            rig.steering.set_pulse_us(pulse);
            delay.delay_ms(SWEEP_DWELL_MS).await;

            let mut detail = Detail::new();
            let _ = write!(detail, "pulse={}us", pulse);
            session.emit("servo_sweep", DiagStatus::Info, &detail);
        }
        session.emit("servo_sweep", DiagStatus::Pass, "sweep complete");
    }

    async fn motor_ramp<D, U>(
        &self,
        rig: &mut DiagnosticRig<'_, '_>,
        delay: &mut D,
        session: &mut Session<'_, U>,
    ) where
        D: DelayNs + ?Sized,
        U: UartTx + ?Sized,
    {
        let mut idle_raw = None;
        let mut full_raw = None;
        let mut sense_failed = false;

        for (i, step) in RAMP_STEPS.into_iter().enumerate() {
            let signal = self.mapper.map_throttle(step);
            rig.throttle.apply(signal);
            delay.delay_ms(RAMP_DWELL_MS).await;

            let Some(sense) = rig.current_sense.as_deref_mut() else {
                continue;
            };
            match sense.read_raw() {
                Ok(raw) => {
                    if i == 0 {
                        idle_raw = Some(raw);
                    }
                    if i == RAMP_STEPS.len() - 1 {
                        full_raw = Some(raw);
                    }
                    let mut detail = Detail::new();
                    let _ = write!(
                        detail,
                        "step={}% level={} raw={}",
                        (step * 100.0) as u8,
                        signal.level,
                        raw
                    );
                    session.emit("motor_ramp", DiagStatus::Info, &detail);
                }
                Err(_) => sense_failed = true,
            }
        }

        rig.throttle
            .apply(ThrottleSignal::brake(&self.mapper.profile().throttle));
        delay.delay_ms(RAMP_DWELL_MS).await;

        if rig.current_sense.is_none() {
            session.emit("motor_ramp", DiagStatus::Info, "no current sense");
        } else if sense_failed {
            session.emit("motor_ramp", DiagStatus::Fail, "current sense read error");
        } else {
            match (idle_raw, full_raw) {
                (Some(idle), Some(full)) if full > idle.saturating_add(NO_LOAD_MARGIN) => {
                    session.emit("motor_ramp", DiagStatus::Pass, "load current rises");
                }
                _ => session.emit("motor_ramp", DiagStatus::Warn, "no load"),
            }
        }
    }

    async fn analog<D, U>(
        &self,
        probe: &mut AnalogProbe<'_>,
        delay: &mut D,
        session: &mut Session<'_, U>,
    ) where
        D: DelayNs + ?Sized,
        U: UartTx + ?Sized,
    {
        let mut name = Name::new();
        let _ = write!(name, "analog_{}", probe.config.label);

        let Some(stats) = sample(&mut *probe.input, delay).await else {
            session.emit(&name, DiagStatus::Fail, "read error");
            return;
        };

        let cfg = probe.config;
        let (status, what) = if stats.mean < cfg.fail_below_mv {
            (DiagStatus::Fail, "low")
        } else if stats.mean < cfg.warn_below_mv {
            (DiagStatus::Warn, "low")
        } else if stats.mean > cfg.warn_above_mv {
            (DiagStatus::Warn, "high")
        } else {
            (DiagStatus::Pass, "ok")
        };

        let mut detail = Detail::new();
        let _ = write!(detail, "{} mean={}mV", what, stats.mean);
        session.emit(&name, status, &detail);

        let spread = stats.max - stats.min;
        if spread > cfg.noise_limit_mv {
            let mut detail = Detail::new();
            let _ = write!(detail, "noisy spread={}mV", spread);
            session.emit(&name, DiagStatus::Warn, &detail);
        }
    }
}

struct SampleStats {
    mean: u16,
    min: u16,
    max: u16,
}

async fn sample<A, D>(input: &mut A, delay: &mut D) -> Option<SampleStats>
where
    A: AnalogInput + ?Sized,
    D: DelayNs + ?Sized,
{
    let mut sum: u32 = 0;
    let mut min = u16::MAX;
    let mut max = 0;

    for i in 0..ANALOG_SAMPLES {
        if i > 0 {
            delay.delay_ms(ANALOG_INTERVAL_MS).await;
        }
        let raw = input.read_raw().ok()?;
        let mv = input.to_millivolts(raw);
        sum += mv as u32;
        min = min.min(mv);
        max = max.max(mv);
    }

    Some(SampleStats {
        mean: (sum / ANALOG_SAMPLES as u32) as u16,
        min,
        max,
    })
}

/// Report output for one run
struct Session<'o, U: UartTx + ?Sized> {
    out: &'o mut U,
    report: DiagnosticReport,
}

impl<U: UartTx + ?Sized> Session<'_, U> {
    fn line(&mut self, line: &str) {
        let _ = self.out.write_line(line);
    }

    fn emit(&mut self, test_name: &str, status: DiagStatus, detail: &str) {
        let entry = DiagnosticEntry::new(test_name, status, detail);
        self.line(&entry.to_line());
        self.report.summary.record(status);
        if self.report.entries.push(entry).is_err() {
            log_warn!("diagnostic report full, entry not kept");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalogProbeConfig, HardwareProfile};
    use crate::testing::{loopback, FakeAdc, FakeDelay, FakeSerial, FakeSteering, FakeThrottle};
    use crate::traits::ThrottleActuator;
    use embassy_futures::block_on;
    use rcbridge_protocol::{ReportLine, Verdict};
    use std::string::String as StdString;
    use std::vec::Vec as StdVec;

    fn runner() -> DiagnosticRunner {
        DiagnosticRunner::new(ActuatorMapper::new(HardwareProfile::default()))
    }

    fn battery() -> AnalogProbeConfig {
        AnalogProbeConfig {
            label: String::try_from("battery").unwrap(),
            pin: 26,
            fail_below_mv: 500,
            warn_below_mv: 1000,
            warn_above_mv: 3000,
            noise_limit_mv: 100,
        }
    }

    fn test_lines(serial: &FakeSerial) -> StdVec<StdString> {
        serial
            .tx_lines()
            .into_iter()
            .filter(|l| l.starts_with("TEST:"))
            .collect()
    }

    #[test]
    fn test_report_framing_and_order() {
        let (mut out_a, mut in_a) = loopback(None);
        let mut loopbacks = [LoopbackProbe {
            label: "a",
            output: &mut out_a,
            input: &mut in_a,
        }];
        let mut steering = FakeSteering::default();
        let mut throttle = FakeThrottle::default();
        let mut rig = DiagnosticRig {
            board: "pico_w",
            steering: &mut steering,
            throttle: &mut throttle,
            loopbacks: &mut loopbacks,
            analog: &mut [],
            current_sense: None,
        };
        let mut delay = FakeDelay::default();
        let mut serial = FakeSerial::default();

        let report = block_on(runner().run(&mut rig, &mut delay, &mut serial));

        let lines = serial.tx_lines();
        assert_eq!(lines.first().map(StdString::as_str), Some("DIAG:START"));
        assert_eq!(lines.last().map(StdString::as_str), Some("DIAG:END"));
        assert_eq!(
            lines[1],
            "TEST:board:INFO:pico_w throttle=esc steering=1000-1500-2000us"
        );
        assert_eq!(lines[2], "TEST:pin_a:PASS:loopback ok");
        assert_eq!(report.summary.verdict(), Verdict::AllPassed);
        // Every emitted line parses back
        for line in &lines {
            assert_ne!(ReportLine::classify(line), ReportLine::Other);
        }
    }

    #[test]
    fn test_stuck_high_fails_and_suite_continues() {
        let (mut out_x, mut in_x) = loopback(Some(true));
        let (mut out_y, mut in_y) = loopback(None);
        let mut loopbacks = [
            LoopbackProbe {
                label: "x",
                output: &mut out_x,
                input: &mut in_x,
            },
            LoopbackProbe {
                label: "y",
                output: &mut out_y,
                input: &mut in_y,
            },
        ];
        let mut steering = FakeSteering::default();
        let mut throttle = FakeThrottle::default();
        let config = battery();
        let mut adc = FakeAdc::steady(2048);
        let mut analog = [AnalogProbe {
            config: &config,
            input: &mut adc,
        }];
        let mut rig = DiagnosticRig {
            board: "pico_w",
            steering: &mut steering,
            throttle: &mut throttle,
            loopbacks: &mut loopbacks,
            analog: &mut analog,
            current_sense: None,
        };
        let mut delay = FakeDelay::default();
        let mut serial = FakeSerial::default();

        let report = block_on(runner().run(&mut rig, &mut delay, &mut serial));

        let lines = test_lines(&serial);
        assert!(lines.contains(&"TEST:pin_x:FAIL:stuck HIGH".into()));
        assert!(lines.contains(&"TEST:pin_y:PASS:loopback ok".into()));
        assert!(lines.contains(&"TEST:servo_sweep:PASS:sweep complete".into()));
        assert!(lines.contains(&"TEST:motor_ramp:INFO:no current sense".into()));
        assert!(lines.contains(&"TEST:analog_battery:PASS:ok mean=1650mV".into()));
        assert_eq!(report.summary.verdict(), Verdict::Failed);
        assert_eq!(report.summary.fail, 1);
    }

    #[test]
    fn test_stuck_low() {
        let (mut out, mut input) = loopback(Some(false));
        let mut loopbacks = [LoopbackProbe {
            label: "z",
            output: &mut out,
            input: &mut input,
        }];
        let mut steering = FakeSteering::default();
        let mut throttle = FakeThrottle::default();
        let mut rig = DiagnosticRig {
            board: "pico_w",
            steering: &mut steering,
            throttle: &mut throttle,
            loopbacks: &mut loopbacks,
            analog: &mut [],
            current_sense: None,
        };

        let report = block_on(runner().run(
            &mut rig,
            &mut FakeDelay::default(),
            &mut FakeSerial::default(),
        ));

        let entry = report.find("pin_z").next().unwrap();
        assert_eq!(entry.status, DiagStatus::Fail);
        assert_eq!(entry.detail.as_str(), "stuck LOW");
    }

    #[test]
    fn test_servo_sweep_waypoints_and_neutral_end() {
        let mut steering = FakeSteering::default();
        let mut throttle = FakeThrottle::default();
        let mut rig = DiagnosticRig {
            board: "pico_w",
            steering: &mut steering,
            throttle: &mut throttle,
            loopbacks: &mut [],
            analog: &mut [],
            current_sense: None,
        };
        let mut delay = FakeDelay::default();

        block_on(runner().run(&mut rig, &mut delay, &mut FakeSerial::default()));

        assert_eq!(steering.pulses, [1500, 1000, 2000, 1500, 1500]);
        assert_eq!(
            throttle.signal(),
            Some(ThrottleSignal {
                level: 1500,
                brake_active: false
            })
        );
        // 4 sweep dwells + 6 ramp dwells
        assert_eq!(delay.elapsed_ms(), 4 * 400 + 6 * 300);
    }

    #[test]
    fn test_motor_ramp_steps_then_brake() {
        let mut steering = FakeSteering::default();
        let mut throttle = FakeThrottle::default();
        let mut rig = DiagnosticRig {
            board: "pico_w",
            steering: &mut steering,
            throttle: &mut throttle,
            loopbacks: &mut [],
            analog: &mut [],
            current_sense: None,
        };

        block_on(runner().run(
            &mut rig,
            &mut FakeDelay::default(),
            &mut FakeSerial::default(),
        ));

        let levels: StdVec<(u16, bool)> = throttle
            .history
            .iter()
            .flatten()
            .map(|s| (s.level, s.brake_active))
            .collect();
        assert_eq!(
            levels,
            [
                (1500, true),
                (1625, false),
                (1750, false),
                (1875, false),
                (2000, false),
                (1500, true),
                (1500, false),
            ]
        );
    }

    #[test]
    fn test_motor_ramp_no_load_warning() {
        let mut steering = FakeSteering::default();
        let mut throttle = FakeThrottle::default();
        let mut sense = FakeAdc::cycling(&[100, 105, 110, 112, 115]);
        let mut rig = DiagnosticRig {
            board: "pico_w",
            steering: &mut steering,
            throttle: &mut throttle,
            loopbacks: &mut [],
            analog: &mut [],
            current_sense: Some(&mut sense),
        };

        let report = block_on(runner().run(
            &mut rig,
            &mut FakeDelay::default(),
            &mut FakeSerial::default(),
        ));

        let ramp: StdVec<_> = report.find("motor_ramp").collect();
        assert_eq!(ramp.len(), 6);
        assert_eq!(ramp[1].detail.as_str(), "step=25% level=1625 raw=105");
        assert_eq!(ramp[5].status, DiagStatus::Warn);
        assert_eq!(ramp[5].detail.as_str(), "no load");
    }

    #[test]
    fn test_motor_ramp_with_load_passes() {
        let mut steering = FakeSteering::default();
        let mut throttle = FakeThrottle::default();
        let mut sense = FakeAdc::cycling(&[100, 300, 600, 900, 1200]);
        let mut rig = DiagnosticRig {
            board: "pico_w",
            steering: &mut steering,
            throttle: &mut throttle,
            loopbacks: &mut [],
            analog: &mut [],
            current_sense: Some(&mut sense),
        };

        let report = block_on(runner().run(
            &mut rig,
            &mut FakeDelay::default(),
            &mut FakeSerial::default(),
        ));

        let last = report.find("motor_ramp").last().unwrap();
        assert_eq!(last.status, DiagStatus::Pass);
    }

    #[test]
    fn test_analog_thresholds_and_noise() {
        let config = battery();
        // ~400 mV: below fail threshold
        let mut low = FakeAdc::steady(500);
        // Alternating 1650 / 1900 mV: passes level, spread too wide
        let mut noisy = FakeAdc::cycling(&[2048, 2358]);
        let mut failing = FakeAdc::steady(0);
        failing.fail = true;

        let mut noisy_config = battery();
        noisy_config.label = String::try_from("noisy").unwrap();
        let mut broken_config = battery();
        broken_config.label = String::try_from("broken").unwrap();

        let mut analog = [
            AnalogProbe {
                config: &config,
                input: &mut low,
            },
            AnalogProbe {
                config: &noisy_config,
                input: &mut noisy,
            },
            AnalogProbe {
                config: &broken_config,
                input: &mut failing,
            },
        ];
        let mut steering = FakeSteering::default();
        let mut throttle = FakeThrottle::default();
        let mut rig = DiagnosticRig {
            board: "pico_w",
            steering: &mut steering,
            throttle: &mut throttle,
            loopbacks: &mut [],
            analog: &mut analog,
            current_sense: None,
        };

        let report = block_on(runner().run(
            &mut rig,
            &mut FakeDelay::default(),
            &mut FakeSerial::default(),
        ));

        let battery: StdVec<_> = report.find("analog_battery").collect();
        assert_eq!(battery[0].status, DiagStatus::Fail);

        let noisy: StdVec<_> = report.find("analog_noisy").collect();
        assert_eq!(noisy.len(), 2);
        assert_eq!(noisy[0].status, DiagStatus::Pass);
        assert_eq!(noisy[1].status, DiagStatus::Warn);
        assert!(noisy[1].detail.starts_with("noisy"));

        let broken: StdVec<_> = report.find("analog_broken").collect();
        assert_eq!(broken[0].detail.as_str(), "read error");
    }
}
