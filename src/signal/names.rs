//! Well-known signal names shared by producers, consumers and the web UI.

pub const MICROPHONE_LEFT: &str = "Microphone Left Channel";
pub const MICROPHONE_RIGHT: &str = "Microphone Right Channel";

pub const BANDS_LEFT_SPL: &str = "FFT Bands Left Channel SPL";
pub const BANDS_RIGHT_SPL: &str = "FFT Bands Right Channel SPL";
pub const BANDS_LEFT_NORMALIZED: &str = "FFT Bands Left Channel Normalized";
pub const BANDS_RIGHT_NORMALIZED: &str = "FFT Bands Right Channel Normalized";

pub const POWER_LEFT_SPL: &str = "Left Channel Power SPL";
pub const POWER_RIGHT_SPL: &str = "Right Channel Power SPL";
pub const POWER_LEFT_NORMALIZED: &str = "Left Channel Power Normalized";
pub const POWER_RIGHT_NORMALIZED: &str = "Right Channel Power Normalized";

pub const BIN_DATA_LEFT: &str = "FFT Bands Left Bin Data";
pub const BIN_DATA_RIGHT: &str = "FFT Bands Right Bin Data";

pub const MIN_DB: &str = "Min db";
pub const MAX_DB: &str = "Max db";
pub const MIN_RENDER_FREQUENCY: &str = "Minimum Render Frequency";
pub const MAX_RENDER_FREQUENCY: &str = "Maximum Render Frequency";
pub const COLOR_MAPPING_TYPE: &str = "Color Mapping Type";

pub const PIXEL_GRID: &str = "Pixel Grid";

pub const LED_USER_BRIGHTNESS: &str = "LED User Brightness";
pub const LED_DEVICE_BRIGHTNESS: &str = "LED Device Brightness";
pub const LED_CURRENT_DRAW: &str = "LED Current Draw";

pub const CPU_USAGE: &str = "CPU Usage";
pub const MEMORY_USAGE: &str = "Memory Usage";
pub const CPU_TEMP: &str = "CPU Temp";
pub const LOAD_AVG: &str = "Load Avg";
pub const UPTIME: &str = "Uptime";
pub const DISK_USAGE: &str = "Disk Usage";
pub const NETWORK_USAGE: &str = "Network Usage";
