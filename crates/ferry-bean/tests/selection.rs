//! 方法选择的端到端行为：经 [`BeanProcessor`] 驱动，断言被调用的方法与 Exchange 的最终状态。

use std::sync::Arc;

use ferry_bean::{
    Bean, BeanClass, BeanContext, BeanError, BeanProcessor, DefaultParameterMappingStrategy,
    MethodSignature, ParamAnnotation, TypeDescriptor,
};
use ferry_core::exchange::headers;
use ferry_core::{Exchange, ExchangePattern, LanguageRegistry, Processor, Value, ValueType};
use proptest::prelude::*;

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

struct Overloads;

impl Bean for Overloads {
    fn bean_class(&self) -> Arc<BeanClass> {
        BeanClass::builder::<Overloads>("Overloads")
            .method(
                MethodSignature::new("handleText").param(ValueType::Text).returns(ValueType::Text),
                |_o: &Overloads, mut args| Ok(Value::text(format!("text:{}", args.take::<String>(0)?))),
            )
            .method(
                MethodSignature::new("handleInt").param(ValueType::Int).returns(ValueType::Text),
                |_o: &Overloads, mut args| Ok(Value::text(format!("int:{}", args.take::<i32>(0)?))),
            )
            .method(
                MethodSignature::new("status").returns(ValueType::Text),
                |_o: &Overloads, _args| Ok(Value::text("ok")),
            )
            .build()
    }
}

struct Numbers;

impl Bean for Numbers {
    fn bean_class(&self) -> Arc<BeanClass> {
        BeanClass::builder::<Numbers>("Numbers")
            .method(
                MethodSignature::new("double").param(ValueType::Int).returns(ValueType::Int),
                |_n: &Numbers, mut args| Ok(Value::Int(args.take::<i32>(0)? * 2)),
            )
            .method(
                MethodSignature::new("flip").param(ValueType::Bool).returns(ValueType::Bool),
                |_n: &Numbers, mut args| Ok(Value::Bool(!args.take::<bool>(0)?)),
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
                |_t: &Twins, _args| Ok(Value::text("left")),
            )
            .method(
                MethodSignature::new("right").param(ValueType::Text).returns(ValueType::Text),
                |_t: &Twins, _args| Ok(Value::text("right")),
            )
            .build()
    }
}

struct Audit;

impl Bean for Audit {
    fn bean_class(&self) -> Arc<BeanClass> {
        BeanClass::builder::<Audit>("Audit")
            .method(MethodSignature::new("record").param(ValueType::Text), |_a: &Audit, _args| {
                Ok(Value::text("ignored"))
            })
            .method(
                MethodSignature::new("tag")
                    .param(ValueType::Text)
                    .annotated_param(ValueType::Text, ParamAnnotation::Header("label".into()))
                    .returns(ValueType::Text),
                |_a: &Audit, mut args| {
                    let body = args.take::<String>(0)?;
                    let label = args.take::<String>(1)?;
                    Ok(Value::text(format!("{label}:{body}")))
                },
            )
            .build()
    }
}

fn run(bean: impl Bean, exchange: &mut Exchange) {
    BeanProcessor::for_bean(Arc::new(bean))
        .process(exchange)
        .expect("bean processor never returns errors");
}

fn bean_error(exchange: &Exchange) -> &BeanError {
    exchange
        .exception()
        .and_then(|fault| fault.downcast_origin::<BeanError>())
        .expect("exchange should carry a bean error")
}

#[test]
fn single_method_is_the_default() {
    let mut exchange = Exchange::with_body("ann");
    run(Greeter, &mut exchange);
    assert!(exchange.exception().is_none());
    assert_eq!(exchange.result_message().body(), &Value::text("hello ann"));
}

#[test]
fn body_type_picks_between_text_and_int() {
    let mut exchange = Exchange::with_body("abc");
    run(Overloads, &mut exchange);
    assert_eq!(exchange.result_message().body(), &Value::text("text:abc"));

    let mut exchange = Exchange::with_body(7_i32);
    run(Overloads, &mut exchange);
    assert_eq!(exchange.result_message().body(), &Value::text("int:7"));
}

#[test]
fn numeric_text_is_coerced_to_the_only_convertible_method() {
    let mut exchange = Exchange::with_body("21");
    run(Numbers, &mut exchange);
    assert!(exchange.exception().is_none(), "{:?}", exchange.exception());
    assert_eq!(exchange.result_message().body(), &Value::Int(42));
}

#[test]
fn equal_candidates_are_reported_as_ambiguous() {
    let mut exchange = Exchange::with_body("x");
    run(Twins, &mut exchange);
    let error = bean_error(&exchange);
    assert_eq!(error.code(), "bean.ambiguous_method");
    let names: Vec<&str> = error.candidates().iter().map(|key| key.name()).collect();
    assert_eq!(names, ["left", "right"]);
}

#[test]
fn explicit_name_bypasses_selection_and_is_consumed() {
    let mut exchange = Exchange::with_body("x").with_in_header(headers::BEAN_METHOD_NAME, "right");
    run(Twins, &mut exchange);
    assert!(exchange.exception().is_none());
    assert_eq!(exchange.result_message().body(), &Value::text("right"));
    assert!(!exchange.in_message().has_header(headers::BEAN_METHOD_NAME));
    assert!(
        exchange
            .out_message()
            .is_some_and(|out| !out.has_header(headers::BEAN_METHOD_NAME))
    );
}

#[test]
fn explicit_name_with_no_parameters() {
    let mut exchange = Exchange::with_body("x").with_in_header(headers::BEAN_METHOD_NAME, "status()");
    run(Overloads, &mut exchange);
    assert_eq!(exchange.result_message().body(), &Value::text("ok"));

    let mut exchange = Exchange::with_body("x").with_in_header(headers::BEAN_METHOD_NAME, "handleText()");
    run(Overloads, &mut exchange);
    let error = bean_error(&exchange);
    assert_eq!(error.code(), "bean.method_not_found");
    assert!(error.to_string().contains("with no parameters"));
}

#[test]
fn unknown_explicit_name_is_method_not_found() {
    let mut exchange = Exchange::with_body("x").with_in_header(headers::BEAN_METHOD_NAME, "missing");
    run(Twins, &mut exchange);
    assert_eq!(bean_error(&exchange).code(), "bean.method_not_found");
}

#[test]
fn multi_parameter_array_header_is_consumed() {
    let mut exchange = Exchange::with_body(Value::List(vec![Value::text("ann")]))
        .with_in_header(headers::BEAN_MULTI_PARAMETER_ARRAY, true);
    run(Greeter, &mut exchange);
    assert_eq!(exchange.result_message().body(), &Value::text("hello ann"));
    assert!(!exchange.in_message().has_header(headers::BEAN_MULTI_PARAMETER_ARRAY));
}

#[test]
fn void_methods_leave_the_message_alone() {
    let mut exchange = Exchange::with_body("payload");
    exchange.set_pattern(ExchangePattern::InOnly);
    exchange = exchange.with_in_header(headers::BEAN_METHOD_NAME, "record");
    run(Audit, &mut exchange);
    assert!(exchange.exception().is_none());
    assert!(!exchange.has_out());
    assert_eq!(exchange.result_message().body(), &Value::text("payload"));
}

#[test]
fn non_void_result_carries_inbound_headers() {
    let mut exchange = Exchange::with_body("payload").with_in_header("label", "audit");
    run(Audit, &mut exchange);
    assert!(exchange.exception().is_none(), "{:?}", exchange.exception());
    let out = exchange.out_message().expect("out message");
    assert_eq!(out.body(), &Value::text("audit:payload"));
    assert_eq!(out.header("label"), Some(&Value::text("audit")));
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

impl Bean for Dog {
    fn bean_class(&self) -> Arc<BeanClass> {
        BeanClass::builder::<Dog>("Dog")
            .extends(Animal::class(), |d: &Dog| &d.animal)
            .build()
    }
}

#[test]
fn inherited_methods_run_on_the_embedded_parent() {
    let dog = Dog {
        animal: Animal { sound: "woof" },
    };
    let mut exchange = Exchange::with_body("loudly");
    run(dog, &mut exchange);
    assert!(exchange.exception().is_none(), "{:?}", exchange.exception());
    assert_eq!(exchange.result_message().body(), &Value::text("woof loudly"));
}

#[test]
fn no_candidate_reports_the_scope() {
    struct Quiet;
    impl Bean for Quiet {
        fn bean_class(&self) -> Arc<BeanClass> {
            BeanClass::builder::<Quiet>("Quiet")
                .method(MethodSignature::new("a"), |_q: &Quiet, _args| Ok(Value::Null))
                .method(MethodSignature::new("b"), |_q: &Quiet, _args| Ok(Value::Null))
                .build()
        }
    }
    let mut exchange = Exchange::with_body("x");
    run(Quiet, &mut exchange);
    let error = bean_error(&exchange);
    assert_eq!(error.code(), "bean.no_method_resolved");
    assert!(error.to_string().contains("Singleton"));
}

struct Probe;

const NAMES: [&str; 4] = ["alpha", "beta", "gamma", "delta"];
const TYPES: [ValueType; 4] = [ValueType::Text, ValueType::Int, ValueType::Bool, ValueType::Bytes];

fn probe_class(methods: &[(usize, usize)]) -> Arc<BeanClass> {
    methods
        .iter()
        .fold(BeanClass::builder::<Probe>("Probe"), |builder, &(name, ty)| {
            builder.method(
                MethodSignature::new(NAMES[name]).param(TYPES[ty].clone()).returns(ValueType::Text),
                |_p: &Probe, _args| Ok(Value::Null),
            )
        })
        .build()
}

proptest! {
    #[test]
    fn introspection_is_deterministic(methods in prop::collection::vec((0..4_usize, 0..4_usize), 0..12)) {
        let class = probe_class(&methods);
        let strategy = DefaultParameterMappingStrategy::new();
        let languages = LanguageRegistry::with_defaults();
        let first = TypeDescriptor::introspect(&class, &strategy, &languages);
        let second = TypeDescriptor::introspect(&class, &strategy, &languages);
        let keys = |info: &TypeDescriptor| info.methods().iter().map(|m| m.key().to_string()).collect::<Vec<_>>();
        prop_assert_eq!(keys(&first), keys(&second));
        let by_name = |info: &TypeDescriptor| info.methods_by_name().iter().map(|m| m.key().to_string()).collect::<Vec<_>>();
        prop_assert_eq!(by_name(&first), by_name(&second));
        prop_assert_eq!(first.default_method().is_some(), first.methods().len() == 1);
    }

    #[test]
    fn cached_and_fresh_descriptors_agree(methods in prop::collection::vec((0..4_usize, 0..4_usize), 1..8)) {
        let class = probe_class(&methods);
        let context = BeanContext::new();
        let cached = context.type_descriptor(&class);
        let again = context.type_descriptor(&class);
        prop_assert!(Arc::ptr_eq(&cached, &again));
        let fresh = TypeDescriptor::introspect(&class, context.strategy().as_ref(), context.languages());
        let keys = |info: &TypeDescriptor| info.methods().iter().map(|m| m.key().clone()).collect::<Vec<_>>();
        prop_assert_eq!(keys(&cached), keys(&fresh));
    }
}
