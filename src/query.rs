//! Backend-neutral query descriptions.
//!
//! A [`Query`] is an immutable description of a selection: condition groups,
//! sort keys, a limit, and logical composition (AND/OR/JOIN). It is built by
//! chained calls that each return an extended query and consumed once by a
//! backend adapter, which walks the structure and emits its native
//! predicates. A [`Filter`] is the simpler attribute-map criteria with fuzzy
//! string matching; [`Criteria`] unifies the two for the search entry points.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::InvalidQueryError;
use crate::model::{AttributeValue, Model};

/// Which models a query or listing targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSelector {
    /// Every registered model.
    All,
    /// One or more named models.
    Models(Vec<String>),
}

impl ModelSelector {
    /// Selector for a single typed model.
    pub fn one<M: Model>() -> Self {
        ModelSelector::Models(vec![M::MODEL_NAME.to_string()])
    }

    /// Selector for the named models.
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ModelSelector::Models(names.into_iter().map(Into::into).collect())
    }

    /// Returns true when the given model is selected.
    pub fn matches(&self, model_name: &str) -> bool {
        match self {
            ModelSelector::All => true,
            ModelSelector::Models(names) => names.iter().any(|name| name == model_name),
        }
    }

    /// Narrows `All` to the given fallback selector.
    ///
    /// Backends use this to scope a query that names no model to the models
    /// the search was asked for.
    pub fn resolve(&self, fallback: &ModelSelector) -> ModelSelector {
        match self {
            ModelSelector::All => fallback.clone(),
            other => other.clone(),
        }
    }

    /// The single selected model, when exactly one is named.
    pub fn single(&self) -> Option<&str> {
        match self {
            ModelSelector::Models(names) if names.len() == 1 => Some(&names[0]),
            _ => None,
        }
    }
}

/// A comparison operator on one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Exact equality.
    Equal,
    /// Exact inequality.
    NotEqual,
    /// Strictly greater.
    Greater,
    /// Greater or equal.
    GreaterOrEqual,
    /// Strictly smaller.
    Smaller,
    /// Smaller or equal.
    SmallerOrEqual,
}

impl Comparison {
    /// Evaluates the operator over two attribute values.
    ///
    /// Equality on a list attribute against a scalar means "contains".
    /// Ordering operators require both sides present; a missing value never
    /// satisfies them.
    pub fn evaluate(&self, candidate: &AttributeValue, expected: &AttributeValue) -> bool {
        if let (AttributeValue::List(items), false) =
            (candidate, matches!(expected, AttributeValue::List(_)))
        {
            let contains = items
                .iter()
                .any(|item| item.compare(expected) == Ordering::Equal);
            return match self {
                Comparison::Equal => contains,
                Comparison::NotEqual => !contains,
                _ => false,
            };
        }

        let ordering = candidate.compare(expected);
        match self {
            Comparison::Equal => ordering == Ordering::Equal,
            Comparison::NotEqual => ordering != Ordering::Equal,
            _ => {
                if matches!(candidate, AttributeValue::Null)
                    || matches!(expected, AttributeValue::Null)
                {
                    return false;
                }
                match self {
                    Comparison::Greater => ordering == Ordering::Greater,
                    Comparison::GreaterOrEqual => ordering != Ordering::Less,
                    Comparison::Smaller => ordering == Ordering::Less,
                    Comparison::SmallerOrEqual => ordering != Ordering::Greater,
                    _ => unreachable!(),
                }
            }
        }
    }
}

/// One attribute comparison inside a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// The attribute name (`id_` addresses the identity).
    pub attribute: String,
    /// The comparison operator.
    pub operator: Comparison,
    /// The value compared against.
    pub value: AttributeValue,
}

/// How two queries are composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Both queries must match.
    And,
    /// Either query must match.
    Or,
    /// Relationship traversal: keep entities of the outer query's model that
    /// have at least one related entity matching the inner query. The
    /// relation is the inner model's `{outer_model}_id` attribute.
    Join,
}

/// One sort directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// The attribute sorted by.
    pub attribute: String,
    /// Descending when true.
    pub reverse: bool,
}

/// Conversions accepted by the condition-building query methods.
///
/// Implemented for a single `(attribute, value)` pair and for collections of
/// pairs; several pairs are combined with AND.
pub trait IntoConditions {
    /// Builds the conditions for the given operator.
    fn into_conditions(self, operator: Comparison) -> Vec<Condition>;
}

impl<S: Into<String>, V: Into<AttributeValue>> IntoConditions for (S, V) {
    fn into_conditions(self, operator: Comparison) -> Vec<Condition> {
        vec![Condition {
            attribute: self.0.into(),
            operator,
            value: self.1.into(),
        }]
    }
}

impl<S: Into<String>, V: Into<AttributeValue>> IntoConditions for Vec<(S, V)> {
    fn into_conditions(self, operator: Comparison) -> Vec<Condition> {
        self.into_iter()
            .flat_map(|pair| pair.into_conditions(operator))
            .collect()
    }
}

impl<S: Into<String>, V: Into<AttributeValue>, const N: usize> IntoConditions for [(S, V); N] {
    fn into_conditions(self, operator: Comparison) -> Vec<Condition> {
        self.into_iter()
            .flat_map(|pair| pair.into_conditions(operator))
            .collect()
    }
}

/// A declarative, backend-neutral selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    models: ModelSelector,
    conditions: Vec<Condition>,
    compositions: Vec<(Combinator, Query)>,
    sort: Vec<SortKey>,
    limit: Option<i64>,
}

impl Query {
    /// Starts a query over a single typed model.
    pub fn model<M: Model>() -> Self {
        Self::over(ModelSelector::one::<M>())
    }

    /// Starts a query over the given selector.
    pub fn over(models: ModelSelector) -> Self {
        Self {
            models,
            conditions: Vec::new(),
            compositions: Vec::new(),
            sort: Vec::new(),
            limit: None,
        }
    }

    /// Starts a query over every registered model.
    pub fn all_models() -> Self {
        Self::over(ModelSelector::All)
    }

    fn condition<C: IntoConditions>(mut self, operator: Comparison, conditions: C) -> Self {
        self.conditions.extend(conditions.into_conditions(operator));
        self
    }

    /// Adds equality conditions (AND-combined).
    pub fn equal<C: IntoConditions>(self, conditions: C) -> Self {
        self.condition(Comparison::Equal, conditions)
    }

    /// Adds inequality conditions.
    pub fn not_equal<C: IntoConditions>(self, conditions: C) -> Self {
        self.condition(Comparison::NotEqual, conditions)
    }

    /// Adds strictly-greater conditions.
    pub fn greater<C: IntoConditions>(self, conditions: C) -> Self {
        self.condition(Comparison::Greater, conditions)
    }

    /// Adds greater-or-equal conditions.
    pub fn greater_or_equal<C: IntoConditions>(self, conditions: C) -> Self {
        self.condition(Comparison::GreaterOrEqual, conditions)
    }

    /// Adds strictly-smaller conditions.
    pub fn smaller<C: IntoConditions>(self, conditions: C) -> Self {
        self.condition(Comparison::Smaller, conditions)
    }

    /// Adds smaller-or-equal conditions.
    pub fn smaller_or_equal<C: IntoConditions>(self, conditions: C) -> Self {
        self.condition(Comparison::SmallerOrEqual, conditions)
    }

    fn combine(mut self, combinator: Combinator, mut other: Query) -> Self {
        // A composed query without an explicit target inherits ours.
        if other.models == ModelSelector::All && self.models != ModelSelector::All {
            if combinator != Combinator::Join {
                other.models = self.models.clone();
            }
        }
        self.compositions.push((combinator, other));
        self
    }

    /// Combines with another query; either may match.
    pub fn or(self, other: Query) -> Self {
        self.combine(Combinator::Or, other)
    }

    /// Combines with another query; both must match.
    pub fn and(self, other: Query) -> Self {
        self.combine(Combinator::And, other)
    }

    /// Keeps entities that have at least one related entity matching `other`.
    ///
    /// The relation follows the convention that the related model carries a
    /// `{this_model}_id` attribute holding the parent identity.
    pub fn join(self, other: Query) -> Self {
        self.combine(Combinator::Join, other)
    }

    /// Appends a sort key; multi-key order is call order, stable.
    pub fn sort(mut self, attribute: impl Into<String>, reverse: bool) -> Self {
        self.sort.push(SortKey {
            attribute: attribute.into(),
            reverse,
        });
        self
    }

    /// Caps the number of results.
    ///
    /// Negative counts are rejected with [`InvalidQueryError`] when the query
    /// is executed, before any backend work.
    pub fn limit(mut self, count: i64) -> Self {
        self.limit = Some(count);
        self
    }

    /// The targeted models.
    pub fn models(&self) -> &ModelSelector {
        &self.models
    }

    /// The AND-combined base conditions.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// The composed sub-queries, in composition order.
    pub fn compositions(&self) -> &[(Combinator, Query)] {
        &self.compositions
    }

    /// The sort keys, in call order.
    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort
    }

    /// The result cap, if any.
    pub fn limit_count(&self) -> Option<i64> {
        self.limit
    }

    /// Checks the query for structural problems before execution.
    pub fn validate(&self) -> Result<(), InvalidQueryError> {
        if let Some(limit) = self.limit {
            if limit < 0 {
                return Err(InvalidQueryError::NegativeLimit { limit });
            }
        }
        for (combinator, sub) in &self.compositions {
            if *combinator == Combinator::Join
                && (self.models.single().is_none() || sub.models.single().is_none())
            {
                return Err(InvalidQueryError::JoinWithoutModel);
            }
            sub.validate()?;
        }
        Ok(())
    }
}

/// An attribute filter map, the simple search criteria.
///
/// String values match case-insensitively as substring or regular
/// expression; list attributes match when any element matches; everything
/// else compares exactly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(BTreeMap<String, AttributeValue>);

impl Filter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute condition.
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.0.insert(attribute.into(), value.into());
        self
    }

    /// Returns true when no condition was added.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the `(attribute, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.0.iter()
    }
}

impl<S: Into<String>, V: Into<AttributeValue>> FromIterator<(S, V)> for Filter {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(pairs: I) -> Self {
        Filter(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// Search criteria: either a fuzzy attribute filter or a full query.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    /// Attribute filter map.
    Filter(Filter),
    /// Declarative query.
    Query(Query),
}

impl Criteria {
    /// Validates the criteria before execution.
    pub fn validate(&self) -> Result<(), InvalidQueryError> {
        match self {
            Criteria::Filter(_) => Ok(()),
            Criteria::Query(query) => query.validate(),
        }
    }
}

impl From<Filter> for Criteria {
    fn from(filter: Filter) -> Self {
        Criteria::Filter(filter)
    }
}

impl From<Query> for Criteria {
    fn from(query: Query) -> Self {
        Criteria::Query(query)
    }
}

/// The attribute naming the relation from a child model to its parent.
pub(crate) fn relation_attribute(parent_model: &str) -> String {
    format!("{}_id", parent_model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chained_building_extends_the_query() {
        let query = Query::all_models()
            .equal(("name", "Jane"))
            .greater(("rating", 3i64))
            .sort("rating", true)
            .limit(1);

        assert_eq!(query.conditions().len(), 2);
        assert_eq!(query.sort_keys().len(), 1);
        assert_eq!(query.limit_count(), Some(1));
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_negative_limit_is_rejected() {
        let query = Query::all_models().limit(-1);
        assert!(matches!(
            query.validate(),
            Err(InvalidQueryError::NegativeLimit { limit: -1 })
        ));
    }

    #[test]
    fn test_or_inherits_target_models() {
        let query = Query::over(ModelSelector::named(["author"]))
            .equal(("name", "Jane"))
            .or(Query::all_models().equal(("name", "John")));

        let (combinator, sub) = &query.compositions()[0];
        assert_eq!(*combinator, Combinator::Or);
        assert_eq!(sub.models(), &ModelSelector::named(["author"]));
    }

    #[test]
    fn test_join_requires_single_models() {
        let query = Query::all_models().join(Query::over(ModelSelector::named(["book"])));
        assert!(matches!(
            query.validate(),
            Err(InvalidQueryError::JoinWithoutModel)
        ));
    }

    #[test]
    fn test_many_pairs_combine_with_and() {
        let query = Query::all_models().equal([
            ("name", AttributeValue::from("Jane")),
            ("country", AttributeValue::from("UK")),
        ]);
        assert_eq!(query.conditions().len(), 2);
    }

    #[test]
    fn test_comparison_on_missing_value_never_matches_ordering() {
        assert!(!Comparison::Greater.evaluate(&AttributeValue::Null, &AttributeValue::Int(1)));
        assert!(Comparison::Equal.evaluate(&AttributeValue::Null, &AttributeValue::Null));
        assert!(Comparison::NotEqual.evaluate(&AttributeValue::Null, &AttributeValue::Int(1)));
    }

    #[test]
    fn test_equality_on_list_means_contains() {
        let tags = AttributeValue::List(vec![
            AttributeValue::Str("rust".into()),
            AttributeValue::Str("db".into()),
        ]);
        assert!(Comparison::Equal.evaluate(&tags, &AttributeValue::Str("db".into())));
        assert!(!Comparison::Equal.evaluate(&tags, &AttributeValue::Str("go".into())));
    }
}
