use barrage_core::{IntCondition, PlanError};
use regex::Regex;

#[derive(Debug, Clone)]
pub(crate) enum IntPredicate {
    Eq(i64),
    Ne(i64),
    Lt(i64),
    Le(i64),
    Gt(i64),
    Ge(i64),
    In(Vec<i64>),
    NotIn(Vec<i64>),
    Between(i64, i64),
    NotBetween(i64, i64),
    Regex(Regex),
    None,
}

impl IntPredicate {
    /// Parses `op`/`value` of one condition. `regex` is only accepted
    /// when `allow_regex` is set.
    pub(crate) fn parse(cond: &IntCondition, allow_regex: bool) -> Result<Self, PlanError> {
        let invalid = |reason: String| PlanError::InvalidOperand {
            id: cond.id.clone(),
            op: cond.op.clone(),
            operand: cond.value.clone(),
            reason,
        };
        let single = || {
            cond.value
                .trim()
                .parse::<i64>()
                .map_err(|e| invalid(e.to_string()))
        };
        let list = || -> Result<Vec<i64>, PlanError> {
            let values = cond
                .value
                .split(',')
                .map(|v| v.trim().parse::<i64>().map_err(|e| invalid(e.to_string())))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(values)
        };
        let range = || -> Result<(i64, i64), PlanError> {
            let bounds = list()?;
            match bounds.as_slice() {
                [lo, hi] if lo <= hi => Ok((*lo, *hi)),
                [_, _] => Err(invalid("lower bound exceeds upper bound".to_string())),
                _ => Err(invalid("expected `lo,hi`".to_string())),
            }
        };

        Ok(match cond.op.as_str() {
            "eq" => IntPredicate::Eq(single()?),
            "ne" => IntPredicate::Ne(single()?),
            "lt" => IntPredicate::Lt(single()?),
            "le" => IntPredicate::Le(single()?),
            "gt" => IntPredicate::Gt(single()?),
            "ge" => IntPredicate::Ge(single()?),
            "in" => IntPredicate::In(list()?),
            "nin" => IntPredicate::NotIn(list()?),
            "between" => {
                let (lo, hi) = range()?;
                IntPredicate::Between(lo, hi)
            }
            "notBetween" => {
                let (lo, hi) = range()?;
                IntPredicate::NotBetween(lo, hi)
            }
            "regex" if allow_regex => {
                IntPredicate::Regex(Regex::new(&cond.value).map_err(|e| invalid(e.to_string()))?)
            }
            "none" => IntPredicate::None,
            op => {
                return Err(PlanError::UnknownOperator {
                    id: cond.id.clone(),
                    op: op.to_string(),
                })
            }
        })
    }

    pub(crate) fn test(&self, value: i64) -> bool {
        match self {
            IntPredicate::Eq(v) => value == *v,
            IntPredicate::Ne(v) => value != *v,
            IntPredicate::Lt(v) => value < *v,
            IntPredicate::Le(v) => value <= *v,
            IntPredicate::Gt(v) => value > *v,
            IntPredicate::Ge(v) => value >= *v,
            IntPredicate::In(set) => set.contains(&value),
            IntPredicate::NotIn(set) => !set.contains(&value),
            IntPredicate::Between(lo, hi) => (*lo..=*hi).contains(&value),
            IntPredicate::NotBetween(lo, hi) => !(*lo..=*hi).contains(&value),
            IntPredicate::Regex(re) => re.is_match(&value.to_string()),
            IntPredicate::None => false,
        }
    }
}
