use core::convert::TryInto;
use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use dht_sensor::dht22;
use embedded_svc::{
    http::{client::Client as HttpClient, Method, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    delay::{Delay, Ets},
    gpio::{AnyIOPin, Gpio19, Gpio34, IOPin, Input, InputOutput, InterruptType, PinDriver, Pull},
    i2c::{I2cConfig, I2cDriver},
    ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver},
    prelude::*,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};

use ledmon_common::{
    config::NetworkConfig,
    display::{Display, GraphicPanel, Sh1106, CONNECTING_LABEL, SH1106_ADDRESS},
    telemetry::CONTENT_TYPE_JSON,
    AnalogInput, Board, CollectorLink, CollectorReply, ControlThresholds, DigitalInput,
    EnvironmentSensor, InputMode, MonitorLoop, RuntimeConfig, TransportError,
};

const DHT22_PIN: i32 = 15;

const FAN_PWM_HZ: u32 = 20_000;
const FAST_TICK_MS: u64 = 20;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 2_000;
const HTTP_TIMEOUT_SEC: u64 = 10;
const MAX_RESPONSE_BODY: usize = 4096;
const WATCHDOG_TIMEOUT_SEC: u32 = 60;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let runtime = build_runtime_config();
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    let i2c = I2cDriver::new(
        peripherals.i2c0,
        pins.gpio21,
        pins.gpio22,
        &I2cConfig::new().baudrate(400.kHz().into()),
    )
    .context("failed to initialize I2C bus")?;
    let mut oled = Sh1106::new(i2c, SH1106_ADDRESS);
    if let Err(err) = oled.init() {
        warn!("OLED init failed: {err:?}");
    }
    let mut display = OledDisplay {
        panel: GraphicPanel::new(oled),
    };
    display.show_status(CONNECTING_LABEL);
    display.flush();

    let sensor = EspDht::new(pins.gpio15.downgrade()).context("failed to initialize DHT22")?;

    let adc = AdcDriver::new(peripherals.adc1).context("failed to initialize ADC1")?;
    let channel = AdcChannelDriver::new(
        adc,
        pins.gpio34,
        &AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        },
    )
    .context("failed to configure photodiode channel")?;

    let timer = LedcTimerDriver::new(
        peripherals.ledc.timer0,
        &TimerConfig::default().frequency(FAN_PWM_HZ.Hz().into()),
    )
    .context("failed to configure fan PWM timer")?;
    let fan = LedcDriver::new(peripherals.ledc.channel0, timer, pins.gpio16)
        .context("failed to configure fan PWM channel")?;

    let mut button = PinDriver::input(pins.gpio19)?;
    button.set_pull(Pull::Up)?;

    let wifi = connect_wifi(peripherals.modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;
    match wifi.sta_netif().get_ip_info() {
        Ok(ip_info) if wifi.is_up().unwrap_or(false) => {
            display.show_status(&format!("Connected!\n{}", ip_info.ip));
        }
        _ => display.show_status("Offline"),
    }
    display.flush();

    let board = Board {
        sensor,
        adc: EspPhotodiode { channel, last: 0 },
        fan,
        button: EspButton { pin: button },
        display,
        link: WifiCollector {
            wifi,
            accept_invalid_certs: runtime.network.accept_invalid_certs,
        },
        delay: Delay::new_default(),
    };

    let mut monitor =
        MonitorLoop::new(&runtime, board).context("invalid estimator configuration")?;

    if let Some(edge) = monitor.edge_flag() {
        let pin = &mut monitor.board_mut().button.pin;
        pin.set_interrupt_type(InterruptType::NegEdge)?;
        // The handler only stores to an atomic, which is ISR safe.
        unsafe { pin.subscribe(move || edge.raise())? };
        pin.enable_interrupt()?;
    }

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    add_current_task_to_watchdog()?;

    let started = Instant::now();
    monitor.start(0);

    loop {
        feed_watchdog();
        monitor.tick(started.elapsed().as_millis() as u64);
        thread::sleep(Duration::from_millis(FAST_TICK_MS));
    }
}

/// Credentials and endpoint are baked in at build time.
fn build_runtime_config() -> RuntimeConfig {
    let mut runtime = RuntimeConfig::default();
    runtime.network.wifi_ssid = option_env!("LEDMON_WIFI_SSID").unwrap_or_default().to_string();
    runtime.network.wifi_pass = option_env!("LEDMON_WIFI_PASS").unwrap_or_default().to_string();

    if let Some(url) = option_env!("LEDMON_COLLECTOR_URL") {
        runtime.network.collector_url = url.to_string();
    }
    if let Some(mode) = option_env!("LEDMON_INPUT_MODE").and_then(InputMode::parse) {
        runtime.monitor.input_mode = mode;
    }

    runtime.sanitize();
    runtime
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;

    if network.wifi_ssid.is_empty() {
        warn!("wifi credentials missing; running offline");
        return Ok(esp_wifi);
    }

    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        info!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}");
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected and netif up on attempt {attempt}");
                return Ok(esp_wifi);
            }
            Err(err) => warn!("wifi connect failed on attempt {attempt}: {err:#}"),
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    warn!("all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed; reporter will keep retrying");
    Ok(esp_wifi)
}

struct WifiCollector {
    wifi: EspWifi<'static>,
    accept_invalid_certs: bool,
}

impl CollectorLink for WifiCollector {
    fn is_connected(&mut self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    fn begin_reconnect(&mut self) {
        if let Err(err) = self.wifi.connect() {
            warn!("wifi reconnect request failed: {err:?}");
        }
    }

    fn post_json(&mut self, url: &str, body: &str) -> Result<CollectorReply, TransportError> {
        let transport = |err: &dyn core::fmt::Debug| TransportError(format!("{err:?}"));

        // Without a bundle the TLS layer must be built with server verification
        // disabled (CONFIG_ESP_TLS_SKIP_SERVER_CERT_VERIFY).
        let http_conf = HttpClientConfiguration {
            timeout: Some(Duration::from_secs(HTTP_TIMEOUT_SEC)),
            crt_bundle_attach: if self.accept_invalid_certs {
                None
            } else {
                Some(esp_idf_svc::sys::esp_crt_bundle_attach)
            },
            ..Default::default()
        };
        let connection = EspHttpConnection::new(&http_conf).map_err(|err| transport(&err))?;
        let mut client = HttpClient::wrap(connection);

        let content_length = body.len().to_string();
        let headers = [
            ("content-type", CONTENT_TYPE_JSON),
            ("content-length", content_length.as_str()),
        ];
        let mut request = client
            .request(Method::Post, url, &headers)
            .map_err(|err| transport(&err))?;
        request
            .write_all(body.as_bytes())
            .map_err(|err| transport(&err))?;
        request.flush().map_err(|err| transport(&err))?;

        let mut response = request.submit().map_err(|err| transport(&err))?;
        let status = response.status();

        let mut raw = Vec::new();
        let mut chunk = [0_u8; 512];
        loop {
            let read = response.read(&mut chunk).map_err(|err| transport(&err))?;
            if read == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..read]);
            if raw.len() >= MAX_RESPONSE_BODY {
                warn!("collector response truncated at {MAX_RESPONSE_BODY} bytes");
                break;
            }
        }

        Ok(CollectorReply {
            status,
            body: String::from_utf8_lossy(&raw).into_owned(),
        })
    }
}

struct EspDht {
    pin: PinDriver<'static, AnyIOPin, InputOutput>,
    delay: Ets,
    humidity: f32,
}

impl EspDht {
    fn new(pin: AnyIOPin) -> anyhow::Result<Self> {
        let mut pin = PinDriver::input_output_od(pin)?;
        pin.set_pull(Pull::Up)?;
        pin.set_high()?;

        Ok(Self {
            pin,
            delay: Ets,
            humidity: f32::NAN,
        })
    }
}

impl EnvironmentSensor for EspDht {
    /// One DHT22 transaction; humidity is cached for the following call.
    fn read_temperature(&mut self) -> f32 {
        match dht22::blocking::read(&mut self.delay, &mut self.pin) {
            Ok(reading) => {
                self.humidity = reading.relative_humidity;
                reading.temperature
            }
            Err(err) => {
                warn!("failed to read DHT22 on GPIO{DHT22_PIN}: {err:?}");
                self.humidity = f32::NAN;
                f32::NAN
            }
        }
    }

    fn read_humidity(&mut self) -> f32 {
        self.humidity
    }

    fn reinitialize(&mut self) {
        if let Err(err) = self.pin.set_high() {
            warn!("failed to release DHT22 line: {err:?}");
        }
    }
}

struct EspPhotodiode {
    channel: AdcChannelDriver<'static, Gpio34, AdcDriver<'static, ADC1>>,
    last: u16,
}

impl AnalogInput for EspPhotodiode {
    fn sample(&mut self) -> u16 {
        match self.channel.read_raw() {
            Ok(raw) => {
                self.last = raw;
                raw
            }
            Err(err) => {
                warn!("photodiode ADC read failed: {err:?}");
                self.last
            }
        }
    }
}

struct EspButton {
    pin: PinDriver<'static, Gpio19, Input>,
}

impl DigitalInput for EspButton {
    fn read_level(&mut self) -> bool {
        self.pin.is_high()
    }

    fn rearm(&mut self) {
        if let Err(err) = self.pin.enable_interrupt() {
            warn!("failed to re-enable button interrupt: {err:?}");
        }
    }
}

/// SH1106 panel; drawing is buffered and pushed over I2C on flush.
struct OledDisplay {
    panel: GraphicPanel<Sh1106<I2cDriver<'static>>>,
}

impl Display for OledDisplay {
    fn show_status(&mut self, message: &str) {
        self.panel.show_status(message);
    }

    fn show_reading(&mut self, temperature_c: f32, humidity: f32) {
        self.panel.show_reading(temperature_c, humidity);
    }

    fn show_error(&mut self, label: &str) {
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
        if let Err(err) = self.panel.target_mut().flush() {
            warn!("OLED flush failed: {err:?}");
        }
    }
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}
