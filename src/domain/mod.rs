// Domain layer: 傳輸結果模型與對外介面 (ports).

pub mod model;
pub mod ports;
