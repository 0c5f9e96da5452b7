//! 外部命令参数的宽容解析
//!
//! UI / HTTP 侧传入的字段都是松散类型：可能缺失、为 null、数字或
//! 数字字符串。这里统一三条规则：
//!
//! - `lenient_f64`: 数字直取；字符串按 f64 解析；其余视为不可解析
//! - `lenient_i64`: 整数直取；浮点截断；字符串按 i64 解析
//! - `non_empty_str`: "truthy" 校验，仅非空字符串通过
//!
//! `Missing`（字段缺失或 null）与 `Invalid`（存在但不可解析）必须区分：
//! 大多数 setter 对 Invalid 静默放弃，而极性类 setter 对 Invalid 强制 +1。

use serde_json::Value;

/// 单字段解析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed<T> {
    /// 字段缺失或为 null
    Missing,
    /// 存在但不可解析
    Invalid,
    /// 解析成功
    Ok(T),
}

impl<T> Parsed<T> {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }
}

fn field<'a>(payload: &'a Value, key: &str) -> Option<&'a Value> {
    match payload.get(key) {
        None | Some(Value::Null) => None,
        Some(value) => Some(value),
    }
}

/// 宽容 f64 解析
pub fn lenient_f64(payload: &Value, key: &str) -> Parsed<f64> {
    match field(payload, key) {
        None => Parsed::Missing,
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) => Parsed::Ok(v),
            None => Parsed::Invalid,
        },
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(v) => Parsed::Ok(v),
            Err(_) => Parsed::Invalid,
        },
        Some(_) => Parsed::Invalid,
    }
}

/// 宽容 i64 解析（浮点截断，与原始协议的 int() 行为对齐）
pub fn lenient_i64(payload: &Value, key: &str) -> Parsed<i64> {
    match field(payload, key) {
        None => Parsed::Missing,
        Some(Value::Number(n)) => {
            if let Some(v) = n.as_i64() {
                Parsed::Ok(v)
            } else if let Some(v) = n.as_f64() {
                Parsed::Ok(v as i64)
            } else {
                Parsed::Invalid
            }
        },
        Some(Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(v) => Parsed::Ok(v),
            Err(_) => Parsed::Invalid,
        },
        Some(_) => Parsed::Invalid,
    }
}

/// "truthy" 字符串：仅非空字符串通过
pub fn non_empty_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    match field(payload, key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}
