//! 调用引擎：实例来源、原生处理步骤委派、延迟调用、异步完成与缓存。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ferry_bean::{
    Bean, BeanClass, BeanContext, BeanError, BeanProcessor, ConstantBeanTarget, DeferredInvocation,
    InvocationCache, MethodSignature, RegistryBeanTarget, SimpleRegistry,
};
use ferry_core::exchange::headers;
use ferry_core::{
    AsyncProcessor, BoxFuture, Exchange, Fault, Processor, TaskExecutor, TokioExecutor, Value,
    ValueType, kinds,
};

struct Greeter;

impl Bean for Greeter {
    fn bean_class(&self) -> Arc<BeanClass> {
        BeanClass::builder::<Greeter>("Greeter")
            .method(
                MethodSignature::new("greet").param(ValueType::Text).returns(ValueType::Text),
                |_g: &Greeter, mut args| Ok(Value::text(format!("hello {}", args.take::<String>(0)?))),
            )
            .build()
    }
}

struct Shouter;

impl Bean for Shouter {
    fn bean_class(&self) -> Arc<BeanClass> {
        BeanClass::builder::<Shouter>("Shouter")
            .method(
                MethodSignature::new("shout").param(ValueType::Text).returns(ValueType::Text),
                |_s: &Shouter, mut args| Ok(Value::text(format!("{}!", args.take::<String>(0)?.to_uppercase()))),
            )
            .build()
    }
}

struct Twins;

impl Bean for Twins {
    fn bean_class(&self) -> Arc<BeanClass> {
        BeanClass::builder::<Twins>("Twins")
            .method(
                MethodSignature::new("left").param(ValueType::Text).returns(ValueType::Text),
                |_t: &Twins, mut args| Ok(Value::text(format!("left:{}", args.take::<String>(0)?))),
            )
            .method(
                MethodSignature::new("right").param(ValueType::Text).returns(ValueType::Text),
                |_t: &Twins, mut args| Ok(Value::text(format!("right:{}", args.take::<String>(0)?))),
            )
            .build()
    }
}

struct Native;

impl Bean for Native {
    fn bean_class(&self) -> Arc<BeanClass> {
        BeanClass::builder::<Native>("Native")
            .method(
                MethodSignature::new("describe").param(ValueType::Text).returns(ValueType::Text),
                |_n: &Native, _args| Ok(Value::text("described")),
            )
            .build()
    }

    fn as_processor(self: Arc<Self>) -> Option<Arc<dyn Processor>> {
        Some(self)
    }
}

impl Processor for Native {
    fn process(&self, exchange: &mut Exchange) -> Result<(), Fault> {
        exchange.out_message_mut().set_body("native");
        Ok(())
    }
}

struct Slow;

impl Bean for Slow {
    fn bean_class(&self) -> Arc<BeanClass> {
        BeanClass::builder::<Slow>("Slow")
            .async_method(
                MethodSignature::new("later").param(ValueType::Text).returns(ValueType::Text),
                |_s: &Slow, mut args| {
                    let text = args.take::<String>(0);
                    Box::pin(async move {
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                        Ok::<_, Fault>(Value::text(format!("later:{}", text?)))
                    })
                },
            )
            .async_method(
                MethodSignature::new("refuse").param(ValueType::Text).returns(ValueType::Text),
                |_s: &Slow, _args| Box::pin(async { Err::<Value, _>(Fault::illegal_state("refused")) }),
            )
            .build()
    }
}

struct Immediate;

impl Bean for Immediate {
    fn bean_class(&self) -> Arc<BeanClass> {
        BeanClass::builder::<Immediate>("Immediate")
            .async_method(
                MethodSignature::new("now").param(ValueType::Text).returns(ValueType::Text),
                |_i: &Immediate, mut args| {
                    let text = args.take::<String>(0);
                    Box::pin(async move { Ok::<_, Fault>(Value::text(format!("now:{}", text?))) })
                },
            )
            .build()
    }
}

struct Fragile;

impl Bean for Fragile {
    fn bean_class(&self) -> Arc<BeanClass> {
        BeanClass::builder::<Fragile>("Fragile")
            .method(
                MethodSignature::new("crash").param(ValueType::Text).returns(ValueType::Text),
                |_f: &Fragile, _args| panic!("fragile bean gave up"),
            )
            .build()
    }
}

struct Animal {
    sound: &'static str,
}

struct Dog {
    animal: Animal,
}

impl Animal {
    fn class() -> Arc<BeanClass> {
        BeanClass::builder::<Animal>("Animal")
            .method(
                MethodSignature::new("speak").param(ValueType::Text).returns(ValueType::Text),
                |a: &Animal, mut args| Ok(Value::text(format!("{} {}", a.sound, args.take::<String>(0)?))),
            )
            .build()
    }
}

impl Bean for Animal {
    fn bean_class(&self) -> Arc<BeanClass> {
        Animal::class()
    }
}

impl Bean for Dog {
    fn bean_class(&self) -> Arc<BeanClass> {
        BeanClass::builder::<Dog>("Dog")
            .extends(Animal::class(), |d: &Dog| &d.animal)
            .build()
    }
}

/// 丢弃收到的任务而不运行。
struct Discarding;

impl TaskExecutor for Discarding {
    fn spawn(&self, task: BoxFuture<'static, ()>) -> Result<(), Fault> {
        drop(task);
        Ok(())
    }
}

/// 拒绝一切任务。
struct Closed;

impl TaskExecutor for Closed {
    fn spawn(&self, _task: BoxFuture<'static, ()>) -> Result<(), Fault> {
        Err(Fault::illegal_state("executor closed"))
    }
}

fn exception_code(exchange: &Exchange) -> Option<&'static str> {
    exchange
        .exception()
        .and_then(|fault| fault.downcast_origin::<BeanError>())
        .map(BeanError::code)
}

#[test]
fn registry_rebind_triggers_reintrospection() {
    let registry = Arc::new(SimpleRegistry::new());
    registry.bind("service", Arc::new(Greeter));
    let target = Arc::new(RegistryBeanTarget::new("service", registry.clone()));
    let processor = BeanProcessor::builder(target.clone()).build().unwrap();

    let mut exchange = Exchange::with_body("ann");
    processor.process(&mut exchange).unwrap();
    assert_eq!(exchange.result_message().body(), &Value::text("hello ann"));
    assert_eq!(target.last_seen_class().as_deref(), Some("Greeter"));

    registry.bind("service", Arc::new(Shouter));
    let mut exchange = Exchange::with_body("ann");
    processor.process(&mut exchange).unwrap();
    assert_eq!(exchange.result_message().body(), &Value::text("ANN!"));
    assert_eq!(target.last_seen_class().as_deref(), Some("Shouter"));
}

#[test]
fn missing_registry_entry_is_no_such_bean() {
    let registry = Arc::new(SimpleRegistry::new());
    let processor = BeanProcessor::builder(Arc::new(RegistryBeanTarget::new("ghost", registry)))
        .build()
        .unwrap();
    let mut exchange = Exchange::with_body("x");
    processor.process(&mut exchange).unwrap();
    assert_eq!(exception_code(&exchange), Some("bean.no_such_bean"));
}

#[test]
fn native_processor_is_used_unless_a_method_is_named() {
    let processor = BeanProcessor::for_bean(Arc::new(Native));
    let mut exchange = Exchange::with_body("x");
    processor.process(&mut exchange).unwrap();
    assert_eq!(exchange.result_message().body(), &Value::text("native"));

    let mut exchange = Exchange::with_body("x").with_in_header(headers::BEAN_METHOD_NAME, "describe");
    processor.process(&mut exchange).unwrap();
    assert_eq!(exchange.result_message().body(), &Value::text("described"));
}

#[test]
fn deferred_invocation_body_calls_the_recorded_method() {
    let processor = BeanProcessor::for_bean(Arc::new(Twins));
    let body = DeferredInvocation::new("right", vec![ValueType::Text], vec![Value::text("x")]).into_value();
    let mut exchange = Exchange::with_body(body);
    processor.process(&mut exchange).unwrap();
    assert!(exchange.exception().is_none(), "{:?}", exchange.exception());
    assert_eq!(exchange.result_message().body(), &Value::text("right:x"));

    // 参数类型不一致时按参数个数匹配，实参再转换为声明类型。
    let body = DeferredInvocation::new("left", vec![ValueType::Any], vec![Value::Int(3)]).into_value();
    let mut exchange = Exchange::with_body(body);
    processor.process(&mut exchange).unwrap();
    assert_eq!(exchange.result_message().body(), &Value::text("left:3"));
}

#[test]
fn fixed_method_key_skips_selection() {
    let context = BeanContext::new();
    let class = Twins.bean_class();
    let key = context
        .type_descriptor(&class)
        .operation("left")
        .and_then(|methods| methods.first())
        .map(|method| method.key().clone())
        .unwrap();
    let processor = BeanProcessor::builder(Arc::new(ConstantBeanTarget::new(Arc::new(Twins))))
        .context(context)
        .method_key(key)
        .build()
        .unwrap();
    let mut exchange = Exchange::with_body("y");
    processor.process(&mut exchange).unwrap();
    assert_eq!(exchange.result_message().body(), &Value::text("left:y"));
}

#[test]
fn fixed_inherited_method_key_runs_on_the_concrete_instance() {
    let context = BeanContext::new();
    let dog = Arc::new(Dog {
        animal: Animal { sound: "woof" },
    });
    // 同一继承方法先经 `Dog` 再经 `Animal` 内省，两份描述共存于共享缓存。
    context.type_descriptor(&dog.bean_class());
    let key = context
        .type_descriptor(&Animal::class())
        .operation("speak")
        .and_then(|methods| methods.first())
        .map(|method| method.key().clone())
        .unwrap();

    let processor = BeanProcessor::builder(Arc::new(ConstantBeanTarget::new(dog)))
        .context(context.clone())
        .method_key(key.clone())
        .build()
        .unwrap();
    let mut exchange = Exchange::with_body("loudly");
    processor.process(&mut exchange).unwrap();
    assert!(exchange.exception().is_none(), "{:?}", exchange.exception());
    assert_eq!(exchange.result_message().body(), &Value::text("woof loudly"));

    let cat = Arc::new(Animal { sound: "meow" });
    let processor = BeanProcessor::builder(Arc::new(ConstantBeanTarget::new(cat)))
        .context(context)
        .method_key(key)
        .build()
        .unwrap();
    let mut exchange = Exchange::with_body("softly");
    processor.process(&mut exchange).unwrap();
    assert_eq!(exchange.result_message().body(), &Value::text("meow softly"));
}

#[test]
fn fixed_method_name_applies_to_every_exchange() {
    let processor = BeanProcessor::builder(Arc::new(ConstantBeanTarget::new(Arc::new(Twins))))
        .method("right(*)")
        .build()
        .unwrap();
    for body in ["a", "b"] {
        let mut exchange = Exchange::with_body(body);
        processor.process(&mut exchange).unwrap();
        assert_eq!(exchange.result_message().body(), &Value::text(format!("right:{body}")));
    }
}

#[test]
fn malformed_fixed_method_name_fails_the_build() {
    let error = BeanProcessor::builder(Arc::new(ConstantBeanTarget::new(Arc::new(Twins))))
        .method("right(")
        .build()
        .unwrap_err();
    assert_eq!(error.code(), "bean.invalid_method_name");
}

#[test]
fn panics_become_panic_faults() {
    let processor = BeanProcessor::for_bean(Arc::new(Fragile));
    let mut exchange = Exchange::with_body("x");
    processor.process(&mut exchange).unwrap();
    let fault = exchange.exception().unwrap();
    assert!(fault.is_a(&kinds::PANIC));
    assert!(fault.message().contains("fragile bean gave up"));
}

#[test]
fn sync_processing_drives_async_methods_to_completion() {
    let processor = BeanProcessor::for_bean(Arc::new(Immediate));
    let mut exchange = Exchange::with_body("x");
    processor.process(&mut exchange).unwrap();
    assert_eq!(exchange.result_message().body(), &Value::text("now:x"));
}

#[test]
fn sync_processing_runs_async_methods_on_the_executor() {
    let processor = BeanProcessor::for_bean(Arc::new(Slow));
    let mut exchange = Exchange::with_body("x").with_in_header(headers::BEAN_METHOD_NAME, "later");
    processor.process(&mut exchange).unwrap();
    assert!(exchange.exception().is_none(), "{:?}", exchange.exception());
    assert_eq!(exchange.result_message().body(), &Value::text("later:x"));
}

#[test]
fn sync_processing_reports_a_dropped_async_method() {
    let processor = BeanProcessor::builder(Arc::new(ConstantBeanTarget::new(Arc::new(Slow))))
        .executor(Arc::new(Discarding))
        .build()
        .unwrap();
    let mut exchange = Exchange::with_body("x").with_in_header(headers::BEAN_METHOD_NAME, "later");
    processor.process(&mut exchange).unwrap();
    assert!(exchange.exception().is_some_and(|fault| fault.is_a(&kinds::ILLEGAL_STATE)));
}

#[test]
fn callback_fires_once_when_the_executor_loses_the_task() {
    for executor in [
        Arc::new(Discarding) as Arc<dyn TaskExecutor>,
        Arc::new(Closed) as Arc<dyn TaskExecutor>,
    ] {
        let processor = BeanProcessor::builder(Arc::new(ConstantBeanTarget::new(Arc::new(Slow))))
            .executor(executor)
            .build()
            .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let done_sync = processor.process_async(
            Exchange::with_body("x").with_in_header(headers::BEAN_METHOD_NAME, "later"),
            Box::new(move |exchange, done_sync| {
                assert!(!done_sync);
                assert!(exchange.exception().is_some_and(|fault| fault.is_a(&kinds::ILLEGAL_STATE)));
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(!done_sync);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn sync_methods_complete_synchronously_on_the_async_path() {
    let processor = BeanProcessor::for_bean(Arc::new(Greeter));
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let done_sync = processor.process_async(
        Exchange::with_body("ann"),
        Box::new(move |exchange, done_sync| {
            assert!(done_sync);
            assert_eq!(exchange.result_message().body(), &Value::text("hello ann"));
            seen.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert!(done_sync);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

async fn run_async(processor: &BeanProcessor, exchange: Exchange) -> (bool, Exchange, bool) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let done_sync = processor.process_async(
        exchange,
        Box::new(move |exchange, done_sync| {
            let _ = tx.send((exchange, done_sync));
        }),
    );
    let (exchange, callback_sync) = rx.await.expect("callback must be invoked");
    (done_sync, exchange, callback_sync)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_methods_complete_through_the_callback() {
    let processor = BeanProcessor::builder(Arc::new(ConstantBeanTarget::new(Arc::new(Slow))))
        .executor(Arc::new(TokioExecutor::current().expect("inside a tokio runtime")))
        .build()
        .unwrap();

    let exchange = Exchange::with_body("x").with_in_header(headers::BEAN_METHOD_NAME, "later");
    let (done_sync, exchange, callback_sync) = run_async(&processor, exchange).await;
    assert!(!done_sync);
    assert!(!callback_sync);
    assert!(exchange.exception().is_none(), "{:?}", exchange.exception());
    assert_eq!(exchange.result_message().body(), &Value::text("later:x"));

    let exchange = Exchange::with_body("x").with_in_header(headers::BEAN_METHOD_NAME, "refuse");
    let (done_sync, exchange, callback_sync) = run_async(&processor, exchange).await;
    assert!(!done_sync);
    assert!(!callback_sync);
    assert!(exchange.exception().is_some_and(|fault| fault.is_a(&kinds::ILLEGAL_STATE)));
}

#[tokio::test]
async fn selection_failures_complete_synchronously_on_the_async_path() {
    let processor = BeanProcessor::for_bean(Arc::new(Twins));
    let (done_sync, exchange, callback_sync) = run_async(&processor, Exchange::with_body("x")).await;
    assert!(done_sync);
    assert!(callback_sync);
    assert_eq!(exception_code(&exchange), Some("bean.ambiguous_method"));
}

#[test]
fn shared_cache_evicts_and_reintrospects_equivalently() {
    let cache = Arc::new(InvocationCache::new(1, 8));
    let context = BeanContext::builder().cache(cache.clone()).build();

    let first = context.type_descriptor(&Greeter.bean_class());
    context.type_descriptor(&Shouter.bean_class());
    let again = context.type_descriptor(&Greeter.bean_class());

    let stats = cache.stats();
    assert_eq!(stats.types, 1);
    assert!(stats.evictions >= 2);
    assert!(!Arc::ptr_eq(&first, &again));
    let keys = |methods: &[Arc<ferry_bean::MethodDescriptor>]| {
        methods.iter().map(|m| m.key().clone()).collect::<Vec<_>>()
    };
    assert_eq!(keys(first.methods()), keys(again.methods()));

    let processor = BeanProcessor::builder(Arc::new(ConstantBeanTarget::new(Arc::new(Greeter))))
        .context(context)
        .build()
        .unwrap();
    let mut exchange = Exchange::with_body("ann");
    processor.process(&mut exchange).unwrap();
    assert_eq!(exchange.result_message().body(), &Value::text("hello ann"));
}
