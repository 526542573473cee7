#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "ferry-core: 集成路由引擎中被 Bean 调用子系统消费的协作契约。"]
#![doc = ""]
#![doc = "== 模块划分 =="]
#![doc = "1. `value`/`fault`：动态消息数据与异常模型；"]
#![doc = "2. `exchange`：在途消息交换及保留头部；"]
#![doc = "3. `expression`/`converter`：参数求值与类型转换契约；"]
#![doc = "4. `processor`/`runtime`：处理步骤、生产者与任务执行上下文。"]

pub mod converter;
pub mod exchange;
pub mod expression;
pub mod fault;
pub mod future;
pub mod observability;
pub mod processor;
pub mod runtime;
pub mod value;

pub use converter::{ConversionError, DefaultTypeConverter, TypeConverter};
pub use exchange::{Exchange, ExchangePattern, Message};
pub use expression::{Expression, ExpressionRef, Language, LanguageRegistry};
pub use fault::{Fault, FaultKind, FaultOrigin, kinds};
pub use future::BoxFuture;
pub use processor::{
    AsyncCallback, AsyncProcessor, Processor, ProcessorProducer, Producer, process_blocking,
};
pub use runtime::{ExecutorRef, SharedExecutor, TaskExecutor, TokioExecutor};
pub use value::{FromValue, ObjectValue, Value, ValueType};

/// 常用类型一站式导入。
pub mod prelude {
    pub use crate::{
        AsyncCallback, AsyncProcessor, BoxFuture, Exchange, ExchangePattern, Fault, FaultKind,
        Message, Processor, Producer, TaskExecutor, TypeConverter, Value, ValueType,
    };
}
