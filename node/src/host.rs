use std::{
    collections::VecDeque,
    convert::Infallible,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use anyhow::Context;
use embedded_hal::{
    delay::DelayNs,
    pwm::{ErrorType, SetDutyCycle},
};
use ledmon_common::{
    display::{Display, CONNECTING_LABEL},
    telemetry::{CONTENT_TYPE_JSON, COMMAND_FAN_LIMITS},
    AnalogInput, Board, CollectorLink, CollectorReply, ControlThresholds, DigitalInput, EdgeFlag,
    EnvironmentSensor, InputMode, MonitorLoop, RuntimeConfig, TextPanel, TransportError,
};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

const FAST_TICK: Duration = Duration::from_millis(20);
const PRESS_HOLD: Duration = Duration::from_millis(150);
const PHOTODIODE_BASE_RAW: f32 = 2_113.0;

type CommandQueue = Arc<Mutex<VecDeque<Value>>>;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let runtime = load_runtime_config().context("failed to load runtime config")?;
    info!(
        "simulated node: collector {}, interval {} ms, {} input",
        runtime.network.collector_url,
        runtime.monitor.measure_interval_ms,
        runtime.monitor.input_mode.as_str()
    );

    let commands: CommandQueue = Arc::new(Mutex::new(VecDeque::new()));
    let button = SimButton::default();
    let fan_duty = Arc::new(Mutex::new(runtime.monitor.fan_floor_pct));

    let mut display = ConsoleDisplay::default();
    display.show_status(CONNECTING_LABEL);
    display.flush();
    display.show_status(&format!("Connected!\n{}", runtime.network.collector_url));
    display.flush();

    let board = Board {
        sensor: SimDht::default(),
        adc: SimPhotodiode::new(fan_duty.clone()),
        fan: SimFan { duty: fan_duty },
        button: button.clone(),
        display,
        link: LoopbackCollector::new(commands.clone()),
        delay: StdDelay,
    };

    let mut monitor =
        MonitorLoop::new(&runtime, board).context("invalid estimator configuration")?;
    let edge = monitor.edge_flag();

    tokio::spawn(read_console(button, edge, commands));
    info!("console: `b` presses the button");
    info!("console: `limits <min> <max>`, `min <n>` or `max <n>` queue collector commands");

    let stop = Arc::new(AtomicBool::new(false));
    let loop_stop = stop.clone();
    let control = tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        monitor.start(0);
        while !loop_stop.load(Ordering::Relaxed) {
            let now_ms = started.elapsed().as_millis() as u64;
            monitor.tick(now_ms);
            std::thread::sleep(FAST_TICK);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");
    stop.store(true, Ordering::Relaxed);
    control.await.context("control loop panicked")?;

    Ok(())
}

fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let mut runtime = match std::env::var("LEDMON_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read `{path}`"))?;
            RuntimeConfig::from_json(&raw).with_context(|| format!("failed to parse `{path}`"))?
        }
        Err(_) => RuntimeConfig::default(),
    };

    if let Ok(url) = std::env::var("LEDMON_COLLECTOR_URL") {
        runtime.network.collector_url = url;
    }

    if let Some(interval) = std::env::var("LEDMON_INTERVAL_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        runtime.monitor.measure_interval_ms = interval;
    }

    if let Ok(mode) = std::env::var("LEDMON_INPUT_MODE") {
        match InputMode::parse(&mode) {
            Some(mode) => runtime.monitor.input_mode = mode,
            None => warn!(
                "unknown LEDMON_INPUT_MODE `{mode}`; keeping {}",
                runtime.monitor.input_mode.as_str()
            ),
        }
    }

    runtime.sanitize();
    Ok(runtime)
}

#[derive(Debug, Clone, PartialEq)]
enum ConsoleInput {
    Press,
    Limits {
        min_temp: Option<i32>,
        max_temp: Option<i32>,
    },
}

fn parse_console_line(line: &str) -> Option<ConsoleInput> {
    let mut words = line.split_whitespace();
    let verb = words.next()?;
    let mut number = || words.next().and_then(|word| word.parse::<i32>().ok());

    match verb {
        "b" | "button" => Some(ConsoleInput::Press),
        "limits" => Some(ConsoleInput::Limits {
            min_temp: Some(number()?),
            max_temp: Some(number()?),
        }),
        "min" => Some(ConsoleInput::Limits {
            min_temp: Some(number()?),
            max_temp: None,
        }),
        "max" => Some(ConsoleInput::Limits {
            min_temp: None,
            max_temp: Some(number()?),
        }),
        _ => None,
    }
}

fn fan_limits_command(min_temp: Option<i32>, max_temp: Option<i32>) -> Value {
    let mut command = Map::new();
    command.insert("type".to_string(), Value::from(COMMAND_FAN_LIMITS));
    if let Some(min_temp) = min_temp {
        command.insert("min_temp".to_string(), Value::from(min_temp));
    }
    if let Some(max_temp) = max_temp {
        command.insert("max_temp".to_string(), Value::from(max_temp));
    }
    Value::Object(command)
}

async fn read_console(button: SimButton, edge: Option<EdgeFlag>, commands: CommandQueue) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!("console read failed: {err}");
                break;
            }
        };

        match parse_console_line(&line) {
            Some(ConsoleInput::Press) => {
                button.press();
                if let Some(edge) = &edge {
                    edge.raise();
                }
            }
            Some(ConsoleInput::Limits { min_temp, max_temp }) => {
                let command = fan_limits_command(min_temp, max_temp);
                info!("queued collector command {command}");
                if let Ok(mut queue) = commands.lock() {
                    queue.push_back(command);
                }
            }
            None if line.trim().is_empty() => {}
            None => warn!("unrecognised input `{}`", line.trim()),
        }
    }
}

/// Active-low button held down for a short moment after each console press.
#[derive(Clone, Default)]
struct SimButton {
    pressed_until: Arc<Mutex<Option<Instant>>>,
}

impl SimButton {
    fn press(&self) {
        if let Ok(mut until) = self.pressed_until.lock() {
            *until = Some(Instant::now() + PRESS_HOLD);
        }
    }
}

impl DigitalInput for SimButton {
    fn read_level(&mut self) -> bool {
        let held = self
            .pressed_until
            .lock()
            .map(|until| until.is_some_and(|deadline| Instant::now() < deadline))
            .unwrap_or(false);
        !held
    }
}

/// Slowly drifting room climate with an occasional dropped read.
#[derive(Default)]
struct SimDht {
    reads: u64,
    humidity: f32,
}

impl EnvironmentSensor for SimDht {
    fn read_temperature(&mut self) -> f32 {
        self.reads = self.reads.saturating_add(1);
        if self.reads % 17 == 0 {
            self.humidity = f32::NAN;
            return f32::NAN;
        }
        self.humidity = 42.0 + (self.reads % 6) as f32 * 0.5;
        21.0 + (self.reads % 8) as f32 * 0.2
    }

    fn read_humidity(&mut self) -> f32 {
        self.humidity
    }

    fn reinitialize(&mut self) {
        debug!("simulated DHT reinitialized");
    }
}

/// Photodiode whose voltage rises (LED cools) as the fan speeds up.
struct SimPhotodiode {
    fan_duty: Arc<Mutex<u8>>,
    noise: u32,
}

impl SimPhotodiode {
    fn new(fan_duty: Arc<Mutex<u8>>) -> Self {
        Self {
            fan_duty,
            noise: 0x2545_F491,
        }
    }
}

impl AnalogInput for SimPhotodiode {
    fn sample(&mut self) -> u16 {
        let duty = self.fan_duty.lock().map(|duty| *duty).unwrap_or(0);

        // xorshift32
        self.noise ^= self.noise << 13;
        self.noise ^= self.noise >> 17;
        self.noise ^= self.noise << 5;
        let jitter = (self.noise % 33) as f32 - 16.0;

        let raw = PHOTODIODE_BASE_RAW - 30.0 + f32::from(duty) * 0.6 + jitter;
        raw.clamp(0.0, 4_095.0) as u16
    }
}

struct SimFan {
    duty: Arc<Mutex<u8>>,
}

impl ErrorType for SimFan {
    type Error = Infallible;
}

impl SetDutyCycle for SimFan {
    fn max_duty_cycle(&self) -> u16 {
        100
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        let pct = duty.min(100) as u8;
        if let Ok(mut current) = self.duty.lock() {
            if *current != pct {
                debug!("fan duty {}% -> {pct}%", *current);
            }
            *current = pct;
        }
        Ok(())
    }
}

/// 20x4 character panel echoed to the log whenever its content changes.
#[derive(Default)]
struct ConsoleDisplay {
    panel: TextPanel,
    status: Option<String>,
    last_render: String,
}

impl Display for ConsoleDisplay {
    fn show_status(&mut self, message: &str) {
        self.status = Some(message.replace('\n', " | "));
    }

    fn show_reading(&mut self, temperature_c: f32, humidity: f32) {
        self.status = None;
        self.panel.show_reading(temperature_c, humidity);
    }

    fn show_error(&mut self, label: &str) {
        self.status = None;
        self.panel.show_error(label);
    }

    fn show_led(&mut self, temperature_c: f32, voltage: f32) {
        self.panel.show_led(temperature_c, voltage);
    }

    fn show_duty(&mut self, duty_pct: u8) {
        self.panel.show_duty(duty_pct);
    }

    fn show_thresholds(&mut self, thresholds: &ControlThresholds) {
        self.panel.show_thresholds(thresholds);
    }

    fn show_send_mode(&mut self, enabled: bool) {
        self.panel.show_send_mode(enabled);
    }

    fn flush(&mut self) {
        let render = match &self.status {
            Some(status) => format!("[{status}]"),
            None => self.panel.render(),
        };
        if render == self.last_render {
            return;
        }
        for row in render.lines() {
            info!("display | {row}");
        }
        self.last_render = render;
    }
}

/// In-process stand-in for the collector endpoint: logs each POST and
/// answers 201 with whatever commands the console queued.
struct LoopbackCollector {
    commands: CommandQueue,
}

impl LoopbackCollector {
    fn new(commands: CommandQueue) -> Self {
        Self { commands }
    }
}

impl CollectorLink for LoopbackCollector {
    fn is_connected(&mut self) -> bool {
        true
    }

    fn begin_reconnect(&mut self) {}

    fn post_json(&mut self, url: &str, body: &str) -> Result<CollectorReply, TransportError> {
        info!("POST {url} ({CONTENT_TYPE_JSON}) {body}");

        let pending: Vec<Value> = self
            .commands
            .lock()
            .map_err(|_| TransportError("command queue poisoned".to_string()))?
            .drain(..)
            .collect();

        Ok(CollectorReply {
            status: 201,
            body: json!({ "message": "Data received", "commands": pending }).to_string(),
        })
    }
}

struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}
