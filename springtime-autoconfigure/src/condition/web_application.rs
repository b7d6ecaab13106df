//! Conditions checking if the application is a web application.
//!
//! A web application is detected by the presence of marker classes: servlet web applications
//! require [SERVLET_WEB_APPLICATION_CLASS], reactive ones require
//! [REACTIVE_WEB_APPLICATION_CLASS]. Presence is checked with [ClassNameFilter], so marker classes
//! are never initialized.

use crate::condition::message::ConditionMessage;
use crate::condition::outcome::ConditionOutcome;
use crate::condition::{
    AnnotatedTypeMetadata, ClassNameFilter, Condition, ConditionContext, EnvironmentKind,
    FilteringCondition, ResourceLoaderKind, HIGHEST_PRECEDENCE,
};
use crate::metadata::AutoConfigurationMetadata;
use springtime_loader::class_loader::ClassLoaderPtr;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Annotation requiring a web application.
pub const CONDITIONAL_ON_WEB_APPLICATION: &str = "ConditionalOnWebApplication";

/// Annotation requiring a non-web application.
pub const CONDITIONAL_ON_NOT_WEB_APPLICATION: &str = "ConditionalOnNotWebApplication";

/// Annotation attribute holding the required [WebApplicationType].
pub const TYPE_ATTRIBUTE: &str = "type";

/// Marker class of servlet web applications.
pub const SERVLET_WEB_APPLICATION_CLASS: &str =
    "org.springframework.web.context.support.GenericWebApplicationContext";

/// Marker class of reactive web applications.
pub const REACTIVE_WEB_APPLICATION_CLASS: &str = "org.springframework.web.reactive.HandlerResult";

const SESSION_SCOPE: &str = "session";

/// Required type of web application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WebApplicationType {
    #[default]
    Any,
    Servlet,
    Reactive,
}

impl WebApplicationType {
    /// Maps a metadata value to a type. Values other than `SERVLET` and `REACTIVE` impose no
    /// restriction.
    pub fn from_attribute(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl FromStr for WebApplicationType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ANY" => Ok(Self::Any),
            "SERVLET" => Ok(Self::Servlet),
            "REACTIVE" => Ok(Self::Reactive),
            _ => Err(format!("Unknown web application type: {value}")),
        }
    }
}

impl Display for WebApplicationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Any => "ANY",
            Self::Servlet => "SERVLET",
            Self::Reactive => "REACTIVE",
        })
    }
}

/// Condition matching types annotated with [CONDITIONAL_ON_WEB_APPLICATION] only in web
/// applications, and all other types (e.g. annotated with [CONDITIONAL_ON_NOT_WEB_APPLICATION])
/// only outside of web applications.
#[derive(Clone, Debug, Default)]
pub struct OnWebApplicationCondition {
    class_loader: Option<ClassLoaderPtr>,
}

impl OnWebApplicationCondition {
    /// Creates a condition checking marker classes with given loader when evaluating metadata.
    pub fn new(class_loader: Option<ClassLoaderPtr>) -> Self {
        Self { class_loader }
    }

    fn is_present(&self, class_name: &str) -> bool {
        ClassNameFilter::is_present(class_name, self.class_loader.as_deref())
    }

    fn outcome(&self, required_type: Option<&str>) -> Option<ConditionOutcome> {
        let required = WebApplicationType::from_attribute(required_type?);
        let message = ConditionMessage::for_annotation(CONDITIONAL_ON_WEB_APPLICATION, &[]);
        let servlet_present = self.is_present(SERVLET_WEB_APPLICATION_CLASS);

        match required {
            WebApplicationType::Servlet if !servlet_present => {
                return Some(ConditionOutcome::no_match(
                    message
                        .did_not_find("servlet web application classes")
                        .at_all(),
                ))
            }
            WebApplicationType::Reactive if !self.is_present(REACTIVE_WEB_APPLICATION_CLASS) => {
                return Some(ConditionOutcome::no_match(
                    message
                        .did_not_find("reactive web application classes")
                        .at_all(),
                ))
            }
            _ => {}
        }

        (!servlet_present && !self.is_present(REACTIVE_WEB_APPLICATION_CLASS)).then(|| {
            ConditionOutcome::no_match(
                message
                    .did_not_find("reactive or servlet web application classes")
                    .at_all(),
            )
        })
    }

    fn is_web_application(
        &self,
        context: &dyn ConditionContext,
        metadata: &dyn AnnotatedTypeMetadata,
        required: bool,
    ) -> ConditionOutcome {
        match deduce_type(metadata) {
            WebApplicationType::Servlet => is_servlet_web_application(context),
            WebApplicationType::Reactive => is_reactive_web_application(context),
            WebApplicationType::Any => is_any_web_application(context, required),
        }
    }
}

impl FilteringCondition for OnWebApplicationCondition {
    fn outcomes(
        &self,
        candidates: &[Option<String>],
        metadata: &dyn AutoConfigurationMetadata,
    ) -> Vec<Option<ConditionOutcome>> {
        candidates
            .iter()
            .map(|candidate| {
                candidate.as_deref().and_then(|candidate| {
                    self.outcome(
                        metadata
                            .get(candidate, CONDITIONAL_ON_WEB_APPLICATION)
                            .as_deref(),
                    )
                })
            })
            .collect()
    }

    fn order(&self) -> i32 {
        HIGHEST_PRECEDENCE + 20
    }
}

impl Condition for OnWebApplicationCondition {
    fn match_outcome(
        &self,
        context: &dyn ConditionContext,
        metadata: &dyn AnnotatedTypeMetadata,
    ) -> ConditionOutcome {
        let required = metadata.is_annotated(CONDITIONAL_ON_WEB_APPLICATION);
        let outcome = self.is_web_application(context, metadata, required);
        let message = outcome.condition_message().clone();

        if required != outcome.is_match() {
            ConditionOutcome::no_match(message)
        } else {
            ConditionOutcome::matched(message)
        }
    }
}

fn deduce_type(metadata: &dyn AnnotatedTypeMetadata) -> WebApplicationType {
    metadata
        .annotation_attribute(CONDITIONAL_ON_WEB_APPLICATION, TYPE_ATTRIBUTE)
        .map(|value| WebApplicationType::from_attribute(&value))
        .unwrap_or_default()
}

fn is_marker_present(context: &dyn ConditionContext, class_name: &str) -> bool {
    ClassNameFilter::is_present(class_name, context.class_loader().as_deref())
}

fn is_any_web_application(context: &dyn ConditionContext, required: bool) -> ConditionOutcome {
    let message = ConditionMessage::for_annotation(
        CONDITIONAL_ON_WEB_APPLICATION,
        &[if required { "(required)" } else { "" }],
    );

    let servlet = is_servlet_web_application(context);
    if servlet.is_match() && required {
        return ConditionOutcome::matched(message.because(&servlet.message()));
    }

    let reactive = is_reactive_web_application(context);
    if reactive.is_match() && required {
        return ConditionOutcome::matched(message.because(&reactive.message()));
    }

    ConditionOutcome::new(
        servlet.is_match() || reactive.is_match(),
        message
            .because(&servlet.message())
            .append("and")
            .append(&reactive.message()),
    )
}

fn is_servlet_web_application(context: &dyn ConditionContext) -> ConditionOutcome {
    let message = ConditionMessage::for_condition("", &[]);
    if !is_marker_present(context, SERVLET_WEB_APPLICATION_CLASS) {
        return ConditionOutcome::no_match(
            message
                .did_not_find("servlet web application classes")
                .at_all(),
        );
    }

    if let Some(bean_factory) = context.bean_factory() {
        if bean_factory
            .registered_scope_names()
            .iter()
            .any(|scope| scope == SESSION_SCOPE)
        {
            return ConditionOutcome::matched(message.found_exactly("'session' scope"));
        }
    }

    if context.environment() == EnvironmentKind::ServletWeb {
        return ConditionOutcome::matched(message.found_exactly("ConfigurableWebEnvironment"));
    }

    if context.resource_loader() == ResourceLoaderKind::WebApplicationContext {
        return ConditionOutcome::matched(message.found_exactly("WebApplicationContext"));
    }

    ConditionOutcome::no_match(message.because("not a servlet web application"))
}

fn is_reactive_web_application(context: &dyn ConditionContext) -> ConditionOutcome {
    let message = ConditionMessage::for_condition("", &[]);
    if !is_marker_present(context, REACTIVE_WEB_APPLICATION_CLASS) {
        return ConditionOutcome::no_match(
            message
                .did_not_find("reactive web application classes")
                .at_all(),
        );
    }

    if context.environment() == EnvironmentKind::ReactiveWeb {
        return ConditionOutcome::matched(
            message.found_exactly("ConfigurableReactiveWebEnvironment"),
        );
    }

    if context.resource_loader() == ResourceLoaderKind::ReactiveWebApplicationContext {
        return ConditionOutcome::matched(message.found_exactly("ReactiveWebApplicationContext"));
    }

    ConditionOutcome::no_match(message.because("not a reactive web application"))
}

#[cfg(test)]
mod tests {
    use crate::condition::web_application::{
        OnWebApplicationCondition, WebApplicationType, CONDITIONAL_ON_NOT_WEB_APPLICATION,
        CONDITIONAL_ON_WEB_APPLICATION, REACTIVE_WEB_APPLICATION_CLASS,
        SERVLET_WEB_APPLICATION_CLASS,
    };
    use crate::condition::{
        Condition, EnvironmentKind, FilteringCondition, MockAnnotatedTypeMetadata,
        MockBeanFactoryFacade, ResourceLoaderKind, SimpleAnnotatedTypeMetadata,
        SimpleConditionContext, HIGHEST_PRECEDENCE,
    };
    use crate::metadata::MockAutoConfigurationMetadata;
    use mockall::mock;
    use mockall::predicate::*;
    use springtime_loader::class_loader::{
        ClassLoader, ClassLoaderPtr, ClassPtr, PackagePtr, Resource,
    };
    use springtime_loader::entry_point::{BuiltinClassLoader, ClassDefinition};
    use springtime_loader::error::ClassLoaderError;
    use std::sync::Arc;

    mock! {
        ClassLoader {}

        impl ClassLoader for ClassLoader {
            fn load_class(&self, name: &str, resolve: bool) -> Result<ClassPtr, ClassLoaderError>;

            fn find_resource(&self, name: &str) -> Option<Resource>;

            fn find_resources(&self, name: &str) -> Vec<Resource>;

            fn package(&self, name: &str) -> Option<PackagePtr>;

            fn parent(&self) -> Option<ClassLoaderPtr>;
        }
    }

    impl std::fmt::Debug for MockClassLoader {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockClassLoader").finish()
        }
    }

    fn loader(classes: &[&'static str]) -> ClassLoaderPtr {
        Arc::new(BuiltinClassLoader::from_definitions(
            classes
                .iter()
                .map(|name| ClassDefinition { name: *name, main: None }),
        ))
    }

    fn metadata(entries: &[(&'static str, &'static str)]) -> MockAutoConfigurationMetadata {
        let entries = entries.to_vec();
        let mut metadata = MockAutoConfigurationMetadata::new();
        metadata
            .expect_get()
            .with(always(), eq(CONDITIONAL_ON_WEB_APPLICATION))
            .returning(move |candidate, _| {
                entries
                    .iter()
                    .find(|(name, _)| *name == candidate)
                    .map(|(_, value)| value.to_string())
            });
        metadata
    }

    fn candidates(names: &[&str]) -> Vec<Option<String>> {
        names.iter().map(|name| Some(name.to_string())).collect()
    }

    fn messages(
        condition: &OnWebApplicationCondition,
        candidates: &[Option<String>],
        metadata: &MockAutoConfigurationMetadata,
    ) -> Vec<Option<String>> {
        condition
            .outcomes(candidates, metadata)
            .into_iter()
            .map(|outcome| {
                outcome.map(|outcome| {
                    assert!(!outcome.is_match());
                    outcome.message()
                })
            })
            .collect()
    }

    #[test]
    fn should_keep_outcomes_aligned_with_candidates() {
        let condition = OnWebApplicationCondition::new(Some(loader(&[])));
        let metadata = metadata(&[("b", "SERVLET")]);

        let mut candidates = candidates(&["a", "b", "c"]);
        candidates.insert(1, None);

        assert_eq!(
            messages(&condition, &candidates, &metadata),
            vec![
                None,
                None,
                Some(
                    "@ConditionalOnWebApplication did not find servlet web application classes"
                        .to_string()
                ),
                None,
            ]
        );
    }

    #[test]
    fn should_not_decide_without_declared_type() {
        for classes in [
            vec![],
            vec![SERVLET_WEB_APPLICATION_CLASS],
            vec![SERVLET_WEB_APPLICATION_CLASS, REACTIVE_WEB_APPLICATION_CLASS],
        ] {
            let condition = OnWebApplicationCondition::new(Some(loader(&classes)));
            assert_eq!(
                messages(&condition, &candidates(&["a"]), &metadata(&[])),
                vec![None]
            );
        }
    }

    #[test]
    fn should_not_look_up_marker_classes_without_declared_type() {
        let mut class_loader = MockClassLoader::new();
        class_loader.expect_load_class().never();

        let condition = OnWebApplicationCondition::new(Some(Arc::new(class_loader)));
        let mut candidates = candidates(&["a", "b"]);
        candidates.push(None);

        assert_eq!(
            messages(&condition, &candidates, &metadata(&[])),
            vec![None, None, None]
        );
    }

    #[test]
    fn should_check_declared_marker_classes() {
        let metadata = metadata(&[("servlet", "SERVLET"), ("reactive", "REACTIVE")]);
        let candidates = candidates(&["servlet", "reactive"]);

        let condition = OnWebApplicationCondition::new(Some(loader(&[REACTIVE_WEB_APPLICATION_CLASS])));
        assert_eq!(
            messages(&condition, &candidates, &metadata),
            vec![
                Some(
                    "@ConditionalOnWebApplication did not find servlet web application classes"
                        .to_string()
                ),
                None
            ]
        );

        let condition = OnWebApplicationCondition::new(Some(loader(&[SERVLET_WEB_APPLICATION_CLASS])));
        assert_eq!(
            messages(&condition, &candidates, &metadata),
            vec![
                None,
                Some(
                    "@ConditionalOnWebApplication did not find reactive web application classes"
                        .to_string()
                )
            ]
        );
    }

    #[test]
    fn should_require_any_marker_class_for_any_type() {
        let metadata = metadata(&[("a", "ANY")]);
        let candidates = candidates(&["a"]);

        let condition = OnWebApplicationCondition::new(Some(loader(&[])));
        assert_eq!(
            messages(&condition, &candidates, &metadata),
            vec![Some(
                "@ConditionalOnWebApplication did not find reactive or servlet web application classes"
                    .to_string()
            )]
        );

        for classes in [
            [SERVLET_WEB_APPLICATION_CLASS],
            [REACTIVE_WEB_APPLICATION_CLASS],
        ] {
            let condition = OnWebApplicationCondition::new(Some(loader(&classes)));
            assert_eq!(messages(&condition, &candidates, &metadata), vec![None]);
        }
    }

    #[test]
    fn should_be_ordered_early() {
        assert_eq!(
            OnWebApplicationCondition::default().order(),
            HIGHEST_PRECEDENCE + 20
        );
        assert_eq!(
            WebApplicationType::from_attribute("OTHER"),
            WebApplicationType::Any
        );
        assert_eq!(WebApplicationType::Servlet.to_string(), "SERVLET");
    }

    fn servlet_metadata() -> SimpleAnnotatedTypeMetadata {
        SimpleAnnotatedTypeMetadata::default()
            .with_annotation(CONDITIONAL_ON_WEB_APPLICATION, &[("type", "SERVLET")])
    }

    fn reactive_metadata() -> SimpleAnnotatedTypeMetadata {
        SimpleAnnotatedTypeMetadata::default()
            .with_annotation(CONDITIONAL_ON_WEB_APPLICATION, &[("type", "REACTIVE")])
    }

    #[test]
    fn should_match_servlet_application_by_session_scope() {
        let mut bean_factory = MockBeanFactoryFacade::new();
        bean_factory
            .expect_registered_scope_names()
            .times(1)
            .returning(|| vec!["request".to_string(), "session".to_string()]);

        let context = SimpleConditionContext {
            class_loader: Some(loader(&[SERVLET_WEB_APPLICATION_CLASS])),
            bean_factory: Some(&bean_factory),
            ..Default::default()
        };

        let outcome = OnWebApplicationCondition::default().match_outcome(&context, &servlet_metadata());
        assert!(outcome.is_match());
        assert_eq!(outcome.message(), "found 'session' scope");
    }

    #[test]
    fn should_match_servlet_application_by_environment_or_resource_loader() {
        let condition = OnWebApplicationCondition::default();

        let context = SimpleConditionContext {
            class_loader: Some(loader(&[SERVLET_WEB_APPLICATION_CLASS])),
            environment: EnvironmentKind::ServletWeb,
            ..Default::default()
        };
        let outcome = condition.match_outcome(&context, &servlet_metadata());
        assert!(outcome.is_match());
        assert_eq!(outcome.message(), "found ConfigurableWebEnvironment");

        let context = SimpleConditionContext {
            class_loader: Some(loader(&[SERVLET_WEB_APPLICATION_CLASS])),
            resource_loader: ResourceLoaderKind::WebApplicationContext,
            ..Default::default()
        };
        let outcome = condition.match_outcome(&context, &servlet_metadata());
        assert!(outcome.is_match());
        assert_eq!(outcome.message(), "found WebApplicationContext");

        let context = SimpleConditionContext {
            class_loader: Some(loader(&[SERVLET_WEB_APPLICATION_CLASS])),
            ..Default::default()
        };
        let outcome = condition.match_outcome(&context, &servlet_metadata());
        assert!(!outcome.is_match());
        assert_eq!(outcome.message(), "not a servlet web application");
    }

    #[test]
    fn should_not_match_servlet_application_without_marker_class() {
        let context = SimpleConditionContext {
            class_loader: Some(loader(&[])),
            environment: EnvironmentKind::ServletWeb,
            ..Default::default()
        };

        let outcome = OnWebApplicationCondition::default().match_outcome(&context, &servlet_metadata());
        assert!(!outcome.is_match());
        assert_eq!(outcome.message(), "did not find servlet web application classes");
    }

    #[test]
    fn should_match_reactive_application() {
        let condition = OnWebApplicationCondition::default();

        let context = SimpleConditionContext {
            class_loader: Some(loader(&[REACTIVE_WEB_APPLICATION_CLASS])),
            environment: EnvironmentKind::ReactiveWeb,
            ..Default::default()
        };
        let outcome = condition.match_outcome(&context, &reactive_metadata());
        assert!(outcome.is_match());
        assert_eq!(outcome.message(), "found ConfigurableReactiveWebEnvironment");

        let context = SimpleConditionContext {
            class_loader: Some(loader(&[REACTIVE_WEB_APPLICATION_CLASS])),
            resource_loader: ResourceLoaderKind::ReactiveWebApplicationContext,
            ..Default::default()
        };
        let outcome = condition.match_outcome(&context, &reactive_metadata());
        assert!(outcome.is_match());
        assert_eq!(outcome.message(), "found ReactiveWebApplicationContext");

        let context = SimpleConditionContext {
            class_loader: Some(loader(&[REACTIVE_WEB_APPLICATION_CLASS])),
            environment: EnvironmentKind::ServletWeb,
            ..Default::default()
        };
        let outcome = condition.match_outcome(&context, &reactive_metadata());
        assert!(!outcome.is_match());
        assert_eq!(outcome.message(), "not a reactive web application");

        let context = SimpleConditionContext {
            class_loader: Some(loader(&[])),
            ..Default::default()
        };
        let outcome = condition.match_outcome(&context, &reactive_metadata());
        assert!(!outcome.is_match());
        assert_eq!(outcome.message(), "did not find reactive web application classes");
    }

    #[test]
    fn should_report_first_matching_type_when_required() {
        let context = SimpleConditionContext {
            class_loader: Some(loader(&[
                SERVLET_WEB_APPLICATION_CLASS,
                REACTIVE_WEB_APPLICATION_CLASS,
            ])),
            environment: EnvironmentKind::ReactiveWeb,
            ..Default::default()
        };
        let metadata = SimpleAnnotatedTypeMetadata::default()
            .with_annotation(CONDITIONAL_ON_WEB_APPLICATION, &[]);

        let outcome = OnWebApplicationCondition::default().match_outcome(&context, &metadata);
        assert!(outcome.is_match());
        assert_eq!(
            outcome.message(),
            "@ConditionalOnWebApplication (required) found ConfigurableReactiveWebEnvironment"
        );
    }

    #[test]
    fn should_not_match_required_web_application_outside_of_web_environment() {
        let context = SimpleConditionContext {
            class_loader: Some(loader(&[])),
            ..Default::default()
        };
        let metadata = SimpleAnnotatedTypeMetadata::default()
            .with_annotation(CONDITIONAL_ON_WEB_APPLICATION, &[("type", "ANY")]);

        let outcome = OnWebApplicationCondition::default().match_outcome(&context, &metadata);
        assert!(!outcome.is_match());
        assert_eq!(
            outcome.message(),
            "@ConditionalOnWebApplication (required) did not find servlet web application classes and did not find reactive web application classes"
        );
    }

    #[test]
    fn should_invert_outcome_for_non_web_applications() {
        let metadata = SimpleAnnotatedTypeMetadata::default()
            .with_annotation(CONDITIONAL_ON_NOT_WEB_APPLICATION, &[]);
        let condition = OnWebApplicationCondition::default();

        let context = SimpleConditionContext {
            class_loader: Some(loader(&[SERVLET_WEB_APPLICATION_CLASS])),
            resource_loader: ResourceLoaderKind::WebApplicationContext,
            ..Default::default()
        };
        let outcome = condition.match_outcome(&context, &metadata);
        assert!(!outcome.is_match());
        assert_eq!(
            outcome.message(),
            "@ConditionalOnWebApplication found WebApplicationContext and did not find reactive web application classes"
        );

        let context = SimpleConditionContext {
            class_loader: Some(loader(&[])),
            ..Default::default()
        };
        assert!(Condition::matches(&condition, &context, &metadata));
    }

    #[test]
    fn should_treat_missing_annotation_as_any_type() {
        let mut metadata = MockAnnotatedTypeMetadata::new();
        metadata
            .expect_is_annotated()
            .with(eq(CONDITIONAL_ON_WEB_APPLICATION))
            .return_const(false);
        metadata
            .expect_annotation_attribute()
            .with(eq(CONDITIONAL_ON_WEB_APPLICATION), eq("type"))
            .return_const(None);

        let context = SimpleConditionContext {
            class_loader: Some(loader(&[REACTIVE_WEB_APPLICATION_CLASS])),
            environment: EnvironmentKind::ReactiveWeb,
            ..Default::default()
        };

        let outcome = OnWebApplicationCondition::default().match_outcome(&context, &metadata);
        let any = OnWebApplicationCondition::default().match_outcome(
            &context,
            &SimpleAnnotatedTypeMetadata::default()
                .with_annotation(CONDITIONAL_ON_NOT_WEB_APPLICATION, &[]),
        );

        assert_eq!(outcome, any);
        assert!(!outcome.is_match());
        assert_eq!(
            outcome.message(),
            "@ConditionalOnWebApplication did not find servlet web application classes and found ConfigurableReactiveWebEnvironment"
        );
    }
}
