//! Class rule matching.
//!
//! Rules are tested in declared order and the first one that matches
//! decides the file's fate. Matching never looks at confidence values.

use smallvec::SmallVec;

use ag_core::{ClassRule, Detection, FxHashSet, RuleMode};

/// The rule that won, with what it matched on.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch<'a> {
    /// Position of the rule in the processor's list.
    pub index: usize,

    /// The matching rule.
    pub rule: &'a ClassRule,

    /// The detection that triggered an `any` rule. `all` and `move` have no
    /// single trigger.
    pub trigger: Option<&'a Detection>,

    /// Notification text. `None` lets the action use its default.
    pub message: Option<String>,
}

/// Returns the first rule that matches `detections`.
///
/// # Examples
///
/// ```
/// use ag_core::{BoundingBox, ClassRule, Detection, RuleMode};
/// use ag_pipeline::rules::first_match;
///
/// let rules = vec![
///     ClassRule { name: "cat".into(), mode: RuleMode::Any, keys: ["cat".to_owned()].into_iter().collect(), action: None, throttle: None },
///     ClassRule { name: "other".into(), mode: RuleMode::Move, keys: Default::default(), action: None, throttle: None },
/// ];
/// let detections = vec![
///     Detection::new("dog", 0.4, BoundingBox::new(0.0, 0.0, 5.0, 5.0)),
///     Detection::new("cat", 0.9, BoundingBox::new(10.0, 10.0, 50.0, 50.0)),
/// ];
///
/// let matched = first_match(&rules, &detections).unwrap();
/// assert_eq!(matched.rule.name, "cat");
/// assert_eq!(matched.trigger.map(|d| d.name.as_str()), Some("cat"));
/// ```
#[must_use]
pub fn first_match<'a>(rules: &'a [ClassRule], detections: &'a [Detection]) -> Option<RuleMatch<'a>> {
    rules.iter().enumerate().find_map(|(index, rule)| {
        let (trigger, message) = evaluate(rule, detections)?;
        Some(RuleMatch {
            index,
            rule,
            trigger,
            message,
        })
    })
}

type Verdict<'a> = Option<(Option<&'a Detection>, Option<String>)>;

fn evaluate<'a>(rule: &ClassRule, detections: &'a [Detection]) -> Verdict<'a> {
    match rule.mode {
        RuleMode::Empty => detections.is_empty().then_some((None, None)),
        RuleMode::Any => {
            let trigger = detections.iter().find(|d| rule.keys.contains(&d.name))?;
            let message = format!("[any] Feature {} found in", trigger.name);
            Some((Some(trigger), Some(message)))
        }
        RuleMode::All => {
            let detected: FxHashSet<&str> = detections.iter().map(|d| d.name.as_str()).collect();
            if !rule.keys.iter().all(|key| detected.contains(key.as_str())) {
                return None;
            }
            let message = format!("[all] Features {} found in", detected_names(detections).join(","));
            Some((None, Some(message)))
        }
        RuleMode::Move => Some((None, None)),
    }
}

/// Every detection name in detector order, repeats included.
fn detected_names(detections: &[Detection]) -> SmallVec<[&str; 8]> {
    detections.iter().map(|d| d.name.as_str()).collect()
}
