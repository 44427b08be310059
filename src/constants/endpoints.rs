pub const ENROLL: &str = "/api/devices/enroll";
pub const READINGS: &str = "/api/readings";
pub const LOGIN: &str = "/api/auth/login";
pub const DEVICES: &str = "/api/devices";

pub const HEADER_API_KEY: &str = "x-api-key";
pub const HEADER_DEVICE_ID: &str = "x-device-id";
pub const HEADER_ENROLL_TOKEN: &str = "x-enroll-token";
