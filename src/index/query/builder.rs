use crate::error::{IndexError, Result};
use crate::index::analysis::Analyzer;
use crate::index::constants::*;
use crate::index::ip::{self, IpRange};
use crate::index::query::range::{coalesce, coalesce_ordinals, parse_numeric_value, Range};
use crate::index::query::text::{remove_leading_zeros, tokenize, unquote};
use crate::index::query::{ClauseFactory, FieldType, Occur};
use crate::models::{
    to_millis, EventDetailFilter, EventDetailType, EventFilter, FilterOperator, IndexedDetails,
    TimestampRange,
};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// A value collected for one field, tagged by how it is matched
#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Text(String),
    Millis(Option<i64>, Option<i64>),
    Ordinal(i64),
    Long(Range<i64>),
    Double(Range<f64>),
    Address(IpAddr),
    AddressRange(IpRange),
}

type FieldValues = BTreeMap<FieldType, BTreeMap<String, Vec<FieldValue>>>;

/// One boolean level of a filter under construction
#[derive(Debug, Clone)]
struct ClauseBuilder {
    occur: Occur,
    fields: FieldValues,
    subs: Vec<ClauseBuilder>,
}

impl ClauseBuilder {
    fn new(occur: Occur) -> Self {
        Self {
            occur,
            fields: BTreeMap::new(),
            subs: Vec::new(),
        }
    }

    fn insert(&mut self, field_type: FieldType, field: &str, values: Vec<FieldValue>) {
        let slot = self
            .fields
            .entry(field_type)
            .or_default()
            .entry(field.to_string())
            .or_default();
        for value in values {
            if !slot.contains(&value) {
                slot.push(value);
            }
        }
    }

    /// Add values joined by `op`, nesting a sub-level when `op` disagrees
    /// with this level's occur.
    fn add_values(
        &mut self,
        field_type: FieldType,
        field: &str,
        values: Vec<FieldValue>,
        op: FilterOperator,
    ) {
        if values.is_empty() {
            return;
        }
        let nested = match (self.occur, op) {
            (Occur::Should, FilterOperator::And) => Some(Occur::Must),
            (Occur::Must, FilterOperator::Or) => Some(Occur::Should),
            (Occur::MustNot, FilterOperator::And) => Some(Occur::Should),
            _ => None,
        };
        match nested {
            Some(occur) => {
                let mut sub = ClauseBuilder::new(occur);
                sub.insert(field_type, field, values);
                self.subs.push(sub);
            }
            None => self.insert(field_type, field, values),
        }
    }

    fn add_texts(&mut self, field_type: FieldType, field: &str, values: &[String]) {
        let values = values.iter().cloned().map(FieldValue::Text).collect();
        self.add_values(field_type, field, values, FilterOperator::Or);
    }

    fn add_timestamps(&mut self, field: &str, ranges: &[TimestampRange]) {
        let values = ranges
            .iter()
            .map(|r| {
                FieldValue::Millis(
                    r.start_time.as_ref().map(to_millis),
                    r.end_time.as_ref().map(to_millis),
                )
            })
            .collect();
        self.add_values(FieldType::DateRange, field, values, FilterOperator::Or);
    }

    fn add_ordinals(&mut self, field: &str, ordinals: impl Iterator<Item = i64>) {
        let values = ordinals.map(FieldValue::Ordinal).collect();
        self.add_values(FieldType::EnumNumber, field, values, FilterOperator::Or);
    }

    fn is_empty(&self) -> bool {
        self.fields.values().all(|f| f.is_empty()) && self.subs.iter().all(|s| s.is_empty())
    }
}

/// Compiles filters into backend clauses
pub struct QueryCompiler<'a, F: ClauseFactory> {
    factory: &'a F,
    details: &'a IndexedDetails,
}

impl<'a, F: ClauseFactory> QueryCompiler<'a, F> {
    pub fn new(factory: &'a F, details: &'a IndexedDetails) -> Self {
        Self { factory, details }
    }

    /// Combine a filter and an exclusion filter into one query
    pub fn compile(
        &self,
        filter: Option<&EventFilter>,
        exclusion: Option<&EventFilter>,
    ) -> Result<F::Clause> {
        let filter = match filter {
            Some(f) => self.compile_filter(f)?,
            None => None,
        };
        let exclusion = match exclusion {
            Some(e) => self.compile_filter(e)?,
            None => None,
        };

        Ok(match (filter, exclusion) {
            (None, None) => self.factory.match_all(),
            (Some(filter), None) => filter,
            (Some(filter), Some(exclusion)) => self
                .factory
                .boolean(vec![(Occur::Must, filter), (Occur::MustNot, exclusion)]),
            (None, Some(exclusion)) => self.factory.boolean(vec![
                (Occur::Must, self.factory.match_all()),
                (Occur::MustNot, exclusion),
            ]),
        })
    }

    /// Compile one filter; `None` when it constrains nothing
    pub fn compile_filter(&self, filter: &EventFilter) -> Result<Option<F::Clause>> {
        let mut builder = ClauseBuilder::new(occur_of(filter.operator));
        self.add_filter(&mut builder, filter)?;
        self.build(&builder)
    }

    fn add_filter(&self, builder: &mut ClauseBuilder, filter: &EventFilter) -> Result<()> {
        let counts = filter
            .count_range
            .iter()
            .map(|r| Range::new(r.from, r.to).map(FieldValue::Long))
            .collect::<Result<Vec<_>>>()?;
        builder.add_values(FieldType::NumericRange, FIELD_COUNT, counts, FilterOperator::Or);

        builder.add_texts(FieldType::Wildcard, FIELD_CURRENT_USER_NAME, &filter.current_user_name);
        builder.add_texts(FieldType::Identifier, FIELD_ELEMENT_IDENTIFIER, &filter.element_identifier);
        builder.add_texts(FieldType::Identifier, FIELD_ELEMENT_TITLE, &filter.element_title);
        builder.add_texts(
            FieldType::Identifier,
            FIELD_ELEMENT_SUB_IDENTIFIER,
            &filter.element_sub_identifier,
        );
        builder.add_texts(FieldType::Identifier, FIELD_ELEMENT_SUB_TITLE, &filter.element_sub_title);
        builder.add_texts(FieldType::Wildcard, FIELD_FINGERPRINT, &filter.fingerprint);
        builder.add_texts(FieldType::FullText, FIELD_SUMMARY, &filter.event_summary);
        builder.add_texts(FieldType::FullText, FIELD_MESSAGE, &filter.message);
        builder.add_timestamps(FIELD_FIRST_SEEN_TIME, &filter.first_seen);
        builder.add_timestamps(FIELD_LAST_SEEN_TIME, &filter.last_seen);
        builder.add_timestamps(FIELD_STATUS_CHANGE_TIME, &filter.status_change);
        builder.add_timestamps(FIELD_UPDATE_TIME, &filter.update_time);
        builder.add_ordinals(FIELD_STATUS, filter.status.iter().map(|s| s.ordinal() as i64));
        builder.add_ordinals(FIELD_SEVERITY, filter.severity.iter().map(|s| s.ordinal() as i64));
        builder.add_texts(FieldType::Wildcard, FIELD_AGENT, &filter.agent);
        builder.add_texts(FieldType::Wildcard, FIELD_MONITOR, &filter.monitor);
        builder.add_texts(FieldType::Wildcard, FIELD_EVENT_KEY, &filter.event_key);
        builder.add_texts(FieldType::Wildcard, FIELD_EVENT_CLASS_KEY, &filter.event_class_key);
        builder.add_texts(FieldType::Wildcard, FIELD_EVENT_GROUP, &filter.event_group);
        builder.add_texts(FieldType::Path, FIELD_EVENT_CLASS, &filter.event_class);

        for tag_filter in &filter.tag_filter {
            let values = tag_filter
                .tag_uuids
                .iter()
                .cloned()
                .map(FieldValue::Text)
                .collect();
            builder.add_values(FieldType::Term, FIELD_TAGS, values, tag_filter.op);
        }
        builder.add_texts(FieldType::Wildcard, FIELD_UUID, &filter.uuid);

        for detail in &filter.details {
            self.add_detail(builder, detail)?;
        }

        for subfilter in &filter.subfilter {
            let mut sub = ClauseBuilder::new(occur_of(subfilter.operator));
            self.add_filter(&mut sub, subfilter)?;
            builder.subs.push(sub);
        }
        Ok(())
    }

    fn add_detail(&self, builder: &mut ClauseBuilder, filter: &EventDetailFilter) -> Result<()> {
        let item = self
            .details
            .get(&filter.key)
            .ok_or_else(|| IndexError::UnsupportedField(filter.key.clone()))?;
        let field = self.factory.detail_field(item);
        let mut sub = ClauseBuilder::new(occur_of(filter.op));

        match item.detail_type {
            EventDetailType::String => {
                sub.add_texts(FieldType::Wildcard, &field, &filter.values);
            }
            EventDetailType::Integer | EventDetailType::Long => {
                let ranges = filter
                    .values
                    .iter()
                    .map(|v| parse_numeric_value::<i64>(v).map(FieldValue::Long))
                    .collect::<Result<Vec<_>>>()?;
                sub.insert(FieldType::NumericRange, &field, ranges);
            }
            EventDetailType::Float | EventDetailType::Double => {
                let ranges = filter
                    .values
                    .iter()
                    .map(|v| parse_numeric_value::<f64>(v).map(FieldValue::Double))
                    .collect::<Result<Vec<_>>>()?;
                sub.insert(FieldType::NumericRange, &field, ranges);
            }
            EventDetailType::Path => {
                sub.add_texts(FieldType::Path, &field, &filter.values);
            }
            EventDetailType::IpAddress => {
                for value in &filter.values {
                    let value = unquote(value);
                    match ip::parse_range(value) {
                        Ok(range) if range.is_single() => sub.insert(
                            FieldType::IpAddress,
                            &field,
                            vec![FieldValue::Address(range.from)],
                        ),
                        Ok(range) => sub.insert(
                            FieldType::IpAddressRange,
                            &field,
                            vec![FieldValue::AddressRange(range)],
                        ),
                        Err(_) => sub.insert(
                            FieldType::IpAddressSubstring,
                            &field,
                            vec![FieldValue::Text(value.to_string())],
                        ),
                    }
                }
            }
        }

        if !sub.is_empty() {
            builder.subs.push(sub);
        }
        Ok(())
    }

    fn build(&self, builder: &ClauseBuilder) -> Result<Option<F::Clause>> {
        let mut clauses = Vec::new();

        for (field_type, fields) in &builder.fields {
            for (field, values) in fields {
                match field_type {
                    FieldType::DateRange => self.date_ranges(&mut clauses, field, values)?,
                    FieldType::EnumNumber => self.enum_numbers(&mut clauses, field, values)?,
                    FieldType::FullText => {
                        self.full_text(&mut clauses, builder.occur, field, &texts(values))?
                    }
                    FieldType::Identifier => self.identifiers(&mut clauses, field, &texts(values))?,
                    FieldType::IpAddressSubstring => {
                        self.ip_substrings(&mut clauses, field, &texts(values))?
                    }
                    FieldType::IpAddress => self.ip_addresses(&mut clauses, field, values)?,
                    FieldType::IpAddressRange => self.ip_ranges(&mut clauses, field, values)?,
                    FieldType::NumericRange => {
                        self.numeric_ranges(&mut clauses, builder.occur, field, values)?
                    }
                    FieldType::Path => self.paths(&mut clauses, field, &texts(values))?,
                    FieldType::Term => {
                        self.terms(&mut clauses, builder.occur, field, &texts(values))?
                    }
                    FieldType::Wildcard => self.wildcards(&mut clauses, field, &texts(values))?,
                }
            }
        }

        for sub in &builder.subs {
            if let Some(clause) = self.build(sub)? {
                clauses.push(clause);
            }
        }

        if clauses.len() <= 1 {
            return Ok(clauses.pop());
        }
        let occur = match builder.occur {
            Occur::Should => Occur::Should,
            _ => Occur::Must,
        };
        Ok(Some(
            self.factory
                .boolean(clauses.into_iter().map(|c| (occur, c)).collect()),
        ))
    }

    fn date_ranges(&self, out: &mut Vec<F::Clause>, field: &str, values: &[FieldValue]) -> Result<()> {
        for value in values {
            if let FieldValue::Millis(from, to) = value {
                out.push(self.factory.long_range(field, *from, *to)?);
            }
        }
        Ok(())
    }

    fn enum_numbers(&self, out: &mut Vec<F::Clause>, field: &str, values: &[FieldValue]) -> Result<()> {
        let ordinals = values
            .iter()
            .filter_map(|v| match v {
                FieldValue::Ordinal(o) => Some(*o),
                _ => None,
            })
            .collect();
        for run in coalesce_ordinals(ordinals) {
            out.push(self.factory.long_range(field, run.from, run.to)?);
        }
        Ok(())
    }

    fn full_text(
        &self,
        out: &mut Vec<F::Clause>,
        occur: Occur,
        field: &str,
        values: &[String],
    ) -> Result<()> {
        let mut per_value = Vec::new();

        for value in values {
            let mut inner = Vec::new();
            let mut phrase: Option<Vec<String>> = None;

            for token in Analyzer::Summary.terms(value) {
                let mut token = token.as_str();
                if phrase.is_none() && token.starts_with('"') {
                    token = &token[1..];
                    if token.is_empty() {
                        continue;
                    }
                    phrase = Some(Vec::new());
                }

                match phrase.as_mut() {
                    None => inner.push(self.factory.wildcard(field, token)?),
                    Some(tokens) => {
                        let closes = token.ends_with('"');
                        let token = token.strip_suffix('"').unwrap_or(token);
                        if !token.is_empty() {
                            tokens.push(token.to_string());
                        }
                        if closes {
                            if let Some(tokens) = phrase.take() {
                                if !tokens.is_empty() {
                                    inner.push(self.factory.wildcard_phrase(field, &tokens)?);
                                }
                            }
                        }
                    }
                }
            }

            // An unterminated phrase still matches, so live searches work
            if let Some(tokens) = phrase.take() {
                if !tokens.is_empty() {
                    inner.push(self.factory.wildcard_phrase(field, &tokens)?);
                }
            }

            match inner.len() {
                0 => {}
                1 => per_value.extend(inner),
                _ => per_value.push(
                    self.factory
                        .boolean(inner.into_iter().map(|c| (Occur::Must, c)).collect()),
                ),
            }
        }

        if per_value.len() <= 1 || occur == Occur::Should {
            out.extend(per_value);
        } else {
            out.push(
                self.factory
                    .boolean(per_value.into_iter().map(|c| (Occur::Should, c)).collect()),
            );
        }
        Ok(())
    }

    fn identifiers(&self, out: &mut Vec<F::Clause>, field: &str, values: &[String]) -> Result<()> {
        for value in values {
            let value = value.trim_end_matches('*');
            let unquoted = unquote(value);

            let clause = if value.is_empty() || unquoted != value {
                self.factory
                    .wildcard(&non_analyzed_field(field), &unquoted.to_lowercase())?
            } else if value.chars().count() < MIN_NGRAM_SIZE {
                self.factory.prefix(field, &value.to_lowercase())?
            } else {
                let grams = Analyzer::Identifier.tokens(value);
                if grams.is_empty() {
                    // Every word is shorter than a gram
                    self.factory.wildcard(
                        &non_analyzed_field(field),
                        &format!("*{}*", value.to_lowercase()),
                    )?
                } else {
                    self.factory.ngram_phrase(field, value, &grams)?
                }
            };
            out.push(clause);
        }
        Ok(())
    }

    fn ip_substrings(&self, out: &mut Vec<F::Clause>, field: &str, values: &[String]) -> Result<()> {
        let type_field = format!("{}{}", field, IP_ADDRESS_TYPE_SUFFIX);
        for value in values {
            let family = if value.contains('.') {
                Some(('.', IP_ADDRESS_TYPE_4))
            } else if value.contains(':') {
                Some((':', IP_ADDRESS_TYPE_6))
            } else {
                None
            };

            let clause = match family {
                Some((separator, ip_type)) => {
                    let tokens: Vec<String> = tokenize(value, separator)
                        .iter()
                        .map(|t| remove_leading_zeros(t))
                        .collect();
                    let address = if tokens.is_empty() {
                        self.factory.term(field, value)?
                    } else {
                        self.factory.wildcard_phrase(field, &tokens)?
                    };
                    self.factory.boolean(vec![
                        (Occur::Must, self.factory.term(&type_field, ip_type)?),
                        (Occur::Must, address),
                    ])
                }
                None => self.factory.wildcard(field, &remove_leading_zeros(value))?,
            };
            out.push(clause);
        }
        Ok(())
    }

    fn ip_addresses(&self, out: &mut Vec<F::Clause>, field: &str, values: &[FieldValue]) -> Result<()> {
        let hosts: Vec<String> = values
            .iter()
            .filter_map(|v| match v {
                FieldValue::Address(addr) => Some(ip::canonical_ip_address(addr)),
                _ => None,
            })
            .collect();
        if !hosts.is_empty() {
            let sort_field = format!("{}{}", field, SORT_SUFFIX);
            out.push(self.factory.terms(&sort_field, &hosts)?);
        }
        Ok(())
    }

    fn ip_ranges(&self, out: &mut Vec<F::Clause>, field: &str, values: &[FieldValue]) -> Result<()> {
        let sort_field = format!("{}{}", field, SORT_SUFFIX);
        for value in values {
            if let FieldValue::AddressRange(range) = value {
                out.push(self.factory.string_range(
                    &sort_field,
                    &ip::canonical_ip_address(&range.from),
                    &ip::canonical_ip_address(&range.to),
                )?);
            }
        }
        Ok(())
    }

    fn numeric_ranges(
        &self,
        out: &mut Vec<F::Clause>,
        occur: Occur,
        field: &str,
        values: &[FieldValue],
    ) -> Result<()> {
        let mut longs = Vec::new();
        let mut doubles = Vec::new();
        for value in values {
            match value {
                FieldValue::Long(range) => longs.push(*range),
                FieldValue::Double(range) => doubles.push(*range),
                _ => {}
            }
        }

        // Ranges under MUST intersect; merging them would widen the match
        if occur != Occur::Must {
            longs = coalesce(longs);
            doubles = coalesce(doubles);
        }
        for range in longs {
            out.push(self.factory.long_range(field, range.from, range.to)?);
        }
        for range in doubles {
            out.push(self.factory.double_range(field, range.from, range.to)?);
        }
        Ok(())
    }

    fn paths(&self, out: &mut Vec<F::Clause>, field: &str, values: &[String]) -> Result<()> {
        for value in values {
            let without_leading = value.trim_start_matches('*');
            if without_leading.starts_with('/') {
                let path = without_leading.to_lowercase();
                let non_analyzed = non_analyzed_field(field);
                let clause = if path.ends_with('/') {
                    self.factory.prefix(&non_analyzed, &path)?
                } else if path.ends_with('*') {
                    self.factory
                        .prefix(&non_analyzed, path.trim_end_matches('*'))?
                } else {
                    self.factory.terms(&non_analyzed, &[format!("{}/", path)])?
                };
                out.push(clause);
            } else {
                let tokens = Analyzer::Path.terms(value);
                if tokens.is_empty() {
                    continue;
                }
                out.push(self.factory.wildcard_phrase(field, &tokens)?);
            }
        }
        Ok(())
    }

    fn terms(&self, out: &mut Vec<F::Clause>, occur: Occur, field: &str, values: &[String]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        if occur == Occur::Should {
            out.push(self.factory.terms(field, values)?);
        } else {
            for value in values {
                out.push(self.factory.term(field, value)?);
            }
        }
        Ok(())
    }

    fn wildcards(&self, out: &mut Vec<F::Clause>, field: &str, values: &[String]) -> Result<()> {
        for value in values {
            let trimmed = value.trim_end_matches('*');
            let unquoted = unquote(trimmed);
            let pattern = if trimmed.is_empty() || unquoted.is_empty() {
                unquoted
            } else {
                value.as_str()
            };
            out.push(self.factory.wildcard(field, pattern)?);
        }
        Ok(())
    }
}

fn occur_of(op: FilterOperator) -> Occur {
    match op {
        FilterOperator::Or => Occur::Should,
        FilterOperator::And => Occur::Must,
    }
}

fn texts(values: &[FieldValue]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| match v {
            FieldValue::Text(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}
