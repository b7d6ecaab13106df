//! Condition evaluation protocol.

pub mod message;
pub mod outcome;
pub mod web_application;

use crate::condition::outcome::ConditionOutcome;
use crate::metadata::AutoConfigurationMetadata;
#[cfg(test)]
use mockall::automock;
use springtime_loader::class_loader::{context_class_loader, ClassLoader, ClassLoaderPtr};
use springtime_loader::entry_point::BuiltinClassLoader;
use tracing::trace;

/// Order value of conditions evaluated first.
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// Order value of conditions evaluated last.
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// Class presence checks which never initialize the checked class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassNameFilter {
    Present,
    Missing,
}

impl ClassNameFilter {
    /// Checks if a class name passes this filter.
    pub fn matches(self, class_name: &str, class_loader: Option<&dyn ClassLoader>) -> bool {
        let present = Self::is_present(class_name, class_loader);
        match self {
            Self::Present => present,
            Self::Missing => !present,
        }
    }

    /// Checks if a class can be resolved by given loader, falling back to the context class loader
    /// of the current thread and then to the builtin class loader.
    pub fn is_present(class_name: &str, class_loader: Option<&dyn ClassLoader>) -> bool {
        match class_loader {
            Some(class_loader) => class_loader.load_class(class_name, false).is_ok(),
            None => context_class_loader()
                .unwrap_or_else(BuiltinClassLoader::shared)
                .load_class(class_name, false)
                .is_ok(),
        }
    }
}

/// A read-only facade of the bean factory safe to use in conditions.
#[cfg_attr(test, automock)]
pub trait BeanFactoryFacade {
    /// Returns names of all registered custom scopes.
    fn registered_scope_names(&self) -> Vec<String>;
}

/// Kind of the application environment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EnvironmentKind {
    #[default]
    Standard,
    /// Configurable servlet web environment.
    ServletWeb,
    /// Configurable reactive web environment.
    ReactiveWeb,
}

/// Kind of the resource loader backing the application context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResourceLoaderKind {
    #[default]
    Plain,
    WebApplicationContext,
    ReactiveWebApplicationContext,
}

/// Context information for use by condition implementations.
pub trait ConditionContext {
    /// Returns the class loader used to load candidates, if any.
    fn class_loader(&self) -> Option<ClassLoaderPtr>;

    fn bean_factory(&self) -> Option<&dyn BeanFactoryFacade>;

    fn environment(&self) -> EnvironmentKind;

    fn resource_loader(&self) -> ResourceLoaderKind;
}

/// Context containing only the necessary data and nothing more.
#[derive(Default)]
pub struct SimpleConditionContext<'a> {
    pub class_loader: Option<ClassLoaderPtr>,
    pub bean_factory: Option<&'a dyn BeanFactoryFacade>,
    pub environment: EnvironmentKind,
    pub resource_loader: ResourceLoaderKind,
}

impl ConditionContext for SimpleConditionContext<'_> {
    fn class_loader(&self) -> Option<ClassLoaderPtr> {
        self.class_loader.clone()
    }

    fn bean_factory(&self) -> Option<&dyn BeanFactoryFacade> {
        self.bean_factory
    }

    fn environment(&self) -> EnvironmentKind {
        self.environment
    }

    fn resource_loader(&self) -> ResourceLoaderKind {
        self.resource_loader
    }
}

/// Annotation metadata of the type being evaluated.
#[cfg_attr(test, automock)]
pub trait AnnotatedTypeMetadata {
    /// Checks if the type is annotated with given annotation.
    fn is_annotated(&self, annotation: &str) -> bool;

    /// Returns an attribute value of given annotation, if the type is annotated with it.
    fn annotation_attribute(&self, annotation: &str, attribute: &str) -> Option<String>;
}

/// Annotation metadata backed by a plain list of annotations and their attributes.
#[derive(Clone, Debug, Default)]
pub struct SimpleAnnotatedTypeMetadata {
    annotations: Vec<(String, Vec<(String, String)>)>,
}

impl SimpleAnnotatedTypeMetadata {
    /// Adds an annotation with given attributes.
    pub fn with_annotation(mut self, annotation: &str, attributes: &[(&str, &str)]) -> Self {
        self.annotations.push((
            annotation.to_string(),
            attributes
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        ));
        self
    }
}

impl AnnotatedTypeMetadata for SimpleAnnotatedTypeMetadata {
    fn is_annotated(&self, annotation: &str) -> bool {
        self.annotations.iter().any(|(name, _)| name == annotation)
    }

    fn annotation_attribute(&self, annotation: &str, attribute: &str) -> Option<String> {
        self.annotations
            .iter()
            .find(|(name, _)| name == annotation)
            .and_then(|(_, attributes)| {
                attributes
                    .iter()
                    .find(|(name, _)| name == attribute)
                    .map(|(_, value)| value.clone())
            })
    }
}

/// A single condition deciding if the annotated type applies to the running application.
pub trait Condition {
    /// Determines the outcome of this condition for given type.
    fn match_outcome(
        &self,
        context: &dyn ConditionContext,
        metadata: &dyn AnnotatedTypeMetadata,
    ) -> ConditionOutcome;

    /// Checks if the condition matches, logging the outcome.
    fn matches(
        &self,
        context: &dyn ConditionContext,
        metadata: &dyn AnnotatedTypeMetadata,
    ) -> bool {
        let outcome = self.match_outcome(context, metadata);
        trace!(
            matched = outcome.is_match(),
            message = %outcome,
            "Evaluated condition"
        );

        outcome.is_match()
    }
}

/// A condition able to evaluate many candidates at once using pre-extracted metadata, without
/// loading the candidates.
pub trait FilteringCondition {
    /// Determines outcomes for given candidates. The result is index-aligned with the candidates.
    /// `None` candidates are skipped, and a `None` outcome means no decision.
    fn outcomes(
        &self,
        candidates: &[Option<String>],
        metadata: &dyn AutoConfigurationMetadata,
    ) -> Vec<Option<ConditionOutcome>>;

    /// Returns the order of this filter among other filters. Lower values are evaluated first.
    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }

    /// Determines which candidates pass this filter. Candidates without a decision pass.
    fn matches(
        &self,
        candidates: &[Option<String>],
        metadata: &dyn AutoConfigurationMetadata,
    ) -> Vec<bool> {
        self.outcomes(candidates, metadata)
            .into_iter()
            .zip(candidates)
            .map(|(outcome, candidate)| match outcome {
                Some(outcome) if !outcome.is_match() => {
                    trace!(
                        candidate = candidate.as_deref().unwrap_or_default(),
                        message = %outcome,
                        "Filtered out auto-configuration candidate"
                    );
                    false
                }
                _ => true,
            })
            .collect()
    }
}

/// Filters candidates through all given filters, in filter order. A candidate excluded by one
/// filter is not passed to later ones. The surviving candidates keep their input order.
pub fn filter_candidates(
    candidates: Vec<String>,
    filters: &[&dyn FilteringCondition],
    metadata: &dyn AutoConfigurationMetadata,
) -> Vec<String> {
    let mut filters = filters.to_vec();
    filters.sort_by_key(|filter| filter.order());

    let mut candidates = candidates.into_iter().map(Some).collect::<Vec<_>>();
    let mut skipped = false;

    for filter in filters {
        let matches = filter.matches(&candidates, metadata);
        for (candidate, matched) in candidates.iter_mut().zip(matches) {
            if !matched && candidate.is_some() {
                *candidate = None;
                skipped = true;
            }
        }
    }

    if skipped {
        trace!(
            remaining = candidates.iter().flatten().count(),
            total = candidates.len(),
            "Filtered auto-configuration candidates"
        );
    }

    candidates.into_iter().flatten().collect()
}
