pub const API_KEY: &str = "apikey.json";
pub const QUEUE: &str = "queue.json";
pub const DEVICE: &str = "device.json";
pub const JWT: &str = "jwt.json";
