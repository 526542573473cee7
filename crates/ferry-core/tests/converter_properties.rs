//! 默认类型转换器的性质验证。
//!
//! - **核心目标 (Why)**：body 类型匹配依赖 `try_convert` 的“成功即非空、失败即 None”语义，
//!   以及可赋值类型的直通行为；这里用 proptest 覆盖数值与文本的主要路径。
//! - **合同 (What)**：
//!   1. 任意可由 `Int` 赋值的目标类型，转换后数值不变；
//!   2. 十进制整数文本转换为 `Int` 时得到相同的整数；
//!   3. 含非数字字符的文本永远不能转换为 `Int`。

use ferry_core::{DefaultTypeConverter, TypeConverter, Value, ValueType};
use proptest::prelude::*;

proptest! {
    #[test]
    fn assignable_targets_preserve_numeric_value(n in any::<i32>()) {
        let converter = DefaultTypeConverter::new();
        for target in [ValueType::Int, ValueType::Long, ValueType::Double, ValueType::Number, ValueType::Any] {
            prop_assert!(target.is_assignable_from(&ValueType::Int));
            let converted = converter.convert(&Value::Int(n), &target).unwrap();
            prop_assert_eq!(converted.as_f64(), Some(f64::from(n)));
        }
    }

    #[test]
    fn decimal_text_converts_to_same_int(n in any::<i32>()) {
        let converter = DefaultTypeConverter::new();
        let converted = converter.try_convert(&Value::text(n.to_string()), &ValueType::Int);
        prop_assert_eq!(converted, Some(Value::Int(n)));
    }

    #[test]
    fn alphabetic_text_never_converts_to_int(text in "[a-zA-Z]{1,12}") {
        let converter = DefaultTypeConverter::new();
        prop_assert!(converter.try_convert(&Value::text(text), &ValueType::Int).is_none());
    }
}

#[test]
fn null_is_never_a_successful_conversion() {
    let converter = DefaultTypeConverter::new();
    assert_eq!(converter.convert(&Value::Null, &ValueType::Text).unwrap(), Value::Null);
    assert!(converter.try_convert(&Value::Null, &ValueType::Text).is_none());
}
