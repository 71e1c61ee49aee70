#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and calibration parsing for the pill dispenser.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Calibration CSV loader enforces headers and performs a robust refit
//!   to reduce outlier influence before slope/intercept estimation.
use serde::Deserialize;

/// Calibration CSV schema.
///
/// Expected headers:
/// raw,grams
///
/// Example:
/// raw,grams
/// 842913,0.0
/// 843364,10.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub raw: i64,
    pub grams: f32,
}

/// BCM pin assignments.
#[derive(Debug, Deserialize)]
pub struct Pins {
    /// Button 1: schedule editor / increment
    pub btn_set: u8,
    /// Button 2: confirm / inventory
    pub btn_confirm: u8,
    /// Button 3: time remaining / back to menu
    pub btn_time: u8,
    pub servo_1: u8,
    pub servo_2: u8,
    pub hx711_dt: u8,
    pub hx711_sck: u8,
    /// Serial device of the fingerprint reader
    #[serde(default = "default_fingerprint_uart")]
    pub fingerprint_uart: String,
}

fn default_fingerprint_uart() -> String {
    "/dev/ttyS0".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ButtonsCfg {
    /// Contact-bounce rejection delay
    pub debounce_ms: u64,
    /// How long to wait for a second press after the first one settles
    pub double_press_window_ms: u64,
    /// Buttons are wired to ground with pull-ups (pressed = low)
    pub active_low: bool,
}

impl Default for ButtonsCfg {
    fn default() -> Self {
        Self {
            debounce_ms: 150,
            double_press_window_ms: 400,
            active_low: true,
        }
    }
}

/// How the scheduler treats a dose boundary the control loop did not tick on.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Fire only when a tick lands on the scheduled minute.
    #[default]
    Exact,
    /// Also fire late when a tick observes that the boundary was crossed.
    CatchUp,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerCfg {
    /// Control loop period
    pub tick_ms: u64,
    pub trigger: TriggerMode,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            trigger: TriggerMode::Exact,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DispenseCfg {
    /// Actuations per dose before giving up
    pub max_attempts: u32,
    /// Wait after each actuation for the pill to land
    pub settle_ms: u64,
    /// Pause before the next actuation when no pill was detected
    pub retry_pause_ms: u64,
    /// Raw samples averaged per weight reading
    pub weight_samples: u32,
    /// Fingerprint gate timeout
    pub verify_timeout_ms: u64,
}

impl Default for DispenseCfg {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            settle_ms: 500,
            retry_pause_ms: 1000,
            weight_samples: 5,
            verify_timeout_ms: 20_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct FunnelCfg {
    /// Minimum |weight| in grams that counts as one pill
    pub pill_threshold_g: f32,
    /// |weight| >= threshold * factor flags a probable overdose
    pub overdose_factor: f32,
    /// Servo rest position (physical degrees)
    pub servo_center_deg: f32,
    /// Release swing relative to the rest position (degrees, signed)
    pub servo_offset_deg: f32,
}

impl Default for FunnelCfg {
    fn default() -> Self {
        Self {
            pill_threshold_g: 0.4,
            overdose_factor: 1.8,
            servo_center_deg: 30.0,
            servo_offset_deg: -30.0,
        }
    }
}

fn default_funnel_2() -> FunnelCfg {
    FunnelCfg {
        servo_center_deg: 10.0,
        servo_offset_deg: 31.0,
        ..FunnelCfg::default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InventoryCfg {
    /// Increment applied by one press in the counter screens
    pub refill_step: u32,
    /// Counter wraps back to 0 after this value
    pub max_count: u32,
}

impl Default for InventoryCfg {
    fn default() -> Self {
        Self {
            refill_step: 5,
            max_count: 99,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StateCfg {
    /// JSON file holding inventory and schedules
    pub path: String,
}

impl Default for StateCfg {
    fn default() -> Self {
        Self {
            path: "daily_dose_state.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DisplayBackend {
    /// Framed, untruncated output on stdout
    #[default]
    Terminal,
    /// 16x2 character panel emulation (lines truncated to 16 columns)
    Lcd,
    /// Route screens to the tracing log only
    Log,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DisplayCfg {
    pub backend: DisplayBackend,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorBackend {
    /// Software PWM straight from the GPIO pins
    Pwm,
    /// PCA9685 16-channel driver on I2C (funnel 1 = channel 0, funnel 2 = channel 1)
    #[default]
    Pca9685,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ActuatorCfg {
    pub backend: ActuatorBackend,
    /// I2C address of the PCA9685
    pub i2c_address: u16,
    /// Dwell between servo positions
    pub step_delay_ms: u64,
}

impl Default for ActuatorCfg {
    fn default() -> Self {
        Self {
            backend: ActuatorBackend::Pca9685,
            i2c_address: 0x40,
            step_delay_ms: 55,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScaleCfg {
    /// HX711 counts per gram
    pub reference_unit: f32,
    /// Optional persisted calibration; preferred over `reference_unit` when present.
    pub calibration: Option<PersistedCalibration>,
}

impl Default for ScaleCfg {
    fn default() -> Self {
        Self {
            reference_unit: 45.06,
            calibration: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PersistedCalibration {
    /// grams per count
    pub gain_g_per_count: f32,
    /// tare zero in raw counts
    pub zero_counts: i32,
}

impl From<PersistedCalibration> for Calibration {
    fn from(p: PersistedCalibration) -> Self {
        Calibration {
            offset: p.zero_counts,
            scale_factor: p.gain_g_per_count,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hardware {
    /// Max time to wait for HX711 data-ready (DT low) before failing
    pub sensor_read_timeout_ms: u64,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            sensor_read_timeout_ms: 150,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub buttons: ButtonsCfg,
    #[serde(default)]
    pub scheduler: SchedulerCfg,
    #[serde(default)]
    pub dispense: DispenseCfg,
    #[serde(default)]
    pub funnel_1: FunnelCfg,
    #[serde(default = "default_funnel_2")]
    pub funnel_2: FunnelCfg,
    #[serde(default)]
    pub inventory: InventoryCfg,
    #[serde(default)]
    pub state: StateCfg,
    #[serde(default)]
    pub display: DisplayCfg,
    #[serde(default)]
    pub actuator: ActuatorCfg,
    #[serde(default)]
    pub scale: ScaleCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub hardware: Hardware,
}

impl Config {
    /// Per-funnel settings in funnel order.
    pub fn funnels(&self) -> [&FunnelCfg; 2] {
        [&self.funnel_1, &self.funnel_2]
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Linear HX711 model: grams = scale_factor * (raw - offset).
#[derive(Debug)]
pub struct Calibration {
    pub offset: i32,
    pub scale_factor: f32,
}

impl Calibration {
    /// Build Calibration from calibration rows using ordinary least squares on all points.
    /// Fits grams = a*raw + b, then converts to grams = a*(raw - offset),
    /// where offset = round(-b/a) is the tare baseline in raw counts.
    pub fn from_rows(rows: Vec<CalibrationRow>) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }

        // Strictly monotonic raw values (increasing or decreasing), no duplicates
        let mut dir: i8 = 0;
        for i in 1..rows.len() {
            let d = rows[i].raw - rows[i - 1].raw;
            if d == 0 {
                eyre::bail!(
                    "calibration rows have duplicate raw values at index {} and {}",
                    i - 1,
                    i
                );
            }
            let step_dir = if d > 0 { 1 } else { -1 };
            if dir == 0 {
                dir = step_dir;
            } else if dir != step_dir {
                eyre::bail!(
                    "calibration raw values must be monotonic (strictly increasing or strictly decreasing)"
                );
            }
        }

        let pts: Vec<(i64, f32)> = rows.iter().map(|r| (r.raw, r.grams)).collect();
        let (a0, b0) = ols_fit(&pts)?;

        let sumsq: f64 = pts
            .iter()
            .map(|(x, y)| {
                let r = f64::from(*y) - (a0 * (*x as f64) + b0);
                r * r
            })
            .sum();
        let rms = (sumsq / (pts.len() as f64)).sqrt();

        // Reject outliers with |residual| > 2 sigma and refit if at least 2 remain.
        let (a, b) = robust_refit(&pts, a0, b0, rms, 2.0).unwrap_or((a0, b0));

        let zero_counts = -b / a;
        if !zero_counts.is_finite() {
            eyre::bail!("calibration produced invalid tare baseline");
        }

        Ok(Calibration {
            offset: zero_counts.round() as i32,
            scale_factor: a as f32,
        })
    }

    /// HX711 reference unit (counts per gram) implied by this fit.
    pub fn reference_unit(&self) -> f32 {
        1.0 / self.scale_factor
    }
}

/// OLS fit in f64 for numerical stability.
fn ols_fit(pts: &[(i64, f32)]) -> eyre::Result<(f64, f64)> {
    let n = pts.len() as f64;
    let mean_x = pts.iter().map(|r| r.0 as f64).sum::<f64>() / n;
    let mean_y = pts.iter().map(|r| f64::from(r.1)).sum::<f64>() / n;
    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    for (rx, gy) in pts {
        let x = *rx as f64 - mean_x;
        let y = f64::from(*gy) - mean_y;
        sxx += x * x;
        sxy += x * y;
    }
    if !sxx.is_finite() || sxx == 0.0 {
        eyre::bail!("calibration cannot determine slope (degenerate X variance)");
    }
    let a = sxy / sxx;
    if !a.is_finite() || a == 0.0 {
        eyre::bail!("calibration produced zero or non-finite slope (invalid scale factor)");
    }
    Ok((a, mean_y - a * mean_x))
}

/// Single-step robust refit: drop points with |residual| > k * rms around the
/// initial line and refit the inliers. None when not applicable (non-finite or
/// zero rms, fewer than 2 inliers, nothing rejected, or degenerate variance).
fn robust_refit(pts: &[(i64, f32)], a0: f64, b0: f64, rms: f64, k: f64) -> Option<(f64, f64)> {
    if !(rms.is_finite() && rms > 0.0 && k.is_finite() && k > 0.0) {
        return None;
    }
    let thr = k * rms;
    let inliers: Vec<(i64, f32)> = pts
        .iter()
        .copied()
        .filter(|(x, y)| (f64::from(*y) - (a0 * (*x as f64) + b0)).abs() <= thr)
        .collect();
    if inliers.len() < 2 || inliers.len() == pts.len() {
        return None;
    }
    ols_fit(&inliers).ok()
}

impl TryFrom<Vec<CalibrationRow>> for Calibration {
    type Error = eyre::Report;
    fn try_from(rows: Vec<CalibrationRow>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<Calibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["raw", "grams"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'raw,grams', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    Calibration::try_from(rows)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Buttons
        if self.buttons.debounce_ms == 0 {
            eyre::bail!("buttons.debounce_ms must be >= 1");
        }
        if self.buttons.double_press_window_ms == 0 {
            eyre::bail!("buttons.double_press_window_ms must be >= 1");
        }
        if self.buttons.debounce_ms > 2_000 || self.buttons.double_press_window_ms > 5_000 {
            eyre::bail!("buttons timings are unreasonably large (>2s debounce or >5s window)");
        }

        // Scheduler: the equality triggers need at least one tick per minute
        if self.scheduler.tick_ms == 0 {
            eyre::bail!("scheduler.tick_ms must be >= 1");
        }
        if self.scheduler.tick_ms >= 60_000 {
            eyre::bail!("scheduler.tick_ms must be < 60000 (one tick per minute at least)");
        }

        // Dispense
        if self.dispense.max_attempts == 0 {
            eyre::bail!("dispense.max_attempts must be >= 1");
        }
        if self.dispense.max_attempts > 100 {
            eyre::bail!("dispense.max_attempts is unreasonably large (>100)");
        }
        if self.dispense.weight_samples == 0 {
            eyre::bail!("dispense.weight_samples must be >= 1");
        }
        if self.dispense.verify_timeout_ms == 0 {
            eyre::bail!("dispense.verify_timeout_ms must be >= 1");
        }

        // Funnels
        for (name, f) in [("funnel_1", &self.funnel_1), ("funnel_2", &self.funnel_2)] {
            if !(f.pill_threshold_g.is_finite() && f.pill_threshold_g > 0.0) {
                eyre::bail!("{name}.pill_threshold_g must be > 0.0");
            }
            if !(f.overdose_factor.is_finite() && f.overdose_factor > 1.0) {
                eyre::bail!("{name}.overdose_factor must be > 1.0");
            }
            if !(0.0..=180.0).contains(&f.servo_center_deg) {
                eyre::bail!("{name}.servo_center_deg must be in [0, 180]");
            }
            if !(0.0..=180.0).contains(&(f.servo_center_deg + f.servo_offset_deg)) {
                eyre::bail!("{name}.servo_offset_deg moves the servo outside [0, 180]");
            }
        }

        // Inventory
        if self.inventory.refill_step == 0 {
            eyre::bail!("inventory.refill_step must be >= 1");
        }
        if self.inventory.max_count == 0 {
            eyre::bail!("inventory.max_count must be >= 1");
        }

        // State
        if self.state.path.trim().is_empty() {
            eyre::bail!("state.path must not be empty");
        }

        // Scale
        if !(self.scale.reference_unit.is_finite() && self.scale.reference_unit != 0.0) {
            eyre::bail!("scale.reference_unit must be finite and non-zero");
        }
        if let Some(c) = self.scale.calibration
            && !(c.gain_g_per_count.is_finite() && c.gain_g_per_count != 0.0)
        {
            eyre::bail!("scale.calibration.gain_g_per_count must be finite and non-zero");
        }

        // Hardware
        if self.hardware.sensor_read_timeout_ms == 0 {
            eyre::bail!("hardware.sensor_read_timeout_ms must be >= 1");
        }

        Ok(())
    }
}
