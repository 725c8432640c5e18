//! Construction of initialization routines by name, from task documents, and from
//! the selection guidelines below.
//!
//! | derivatives | Jacobian available        | no Jacobian          |
//! |-------------|---------------------------|----------------------|
//! | 0, 1        | Stack                     | Stack                |
//! | 2           | StackWithJacobian         | NonProbabilisticFit  |
//! | 3, 4, 5     | NonProbabilisticFitWithJacobian | NonProbabilisticFit |
//! | > 5         | TaylorMode with autodiff, otherwise the fit routines  | |
//!
//! Only the autodiff routines return exact derivatives, which matters more the more
//! derivatives are modelled. Stack and StackWithJacobian are essentially free; every
//! other routine relies on integration or differentiation. For stiff problems prefer
//! `NonProbabilisticFitWithJacobian` with `BDF` or `Radau`.
use crate::Utils::task_parser::{SectionMap, Value, parse_section_as};
use crate::numerical::init_routines::autodiff_routines::{ForwardMode, ForwardModeJVP, ReverseMode, TaylorMode};
use crate::numerical::init_routines::init_error::InitError;
use crate::numerical::init_routines::interface::InitializationRoutine;
use crate::numerical::init_routines::non_probabilistic_fit::{
    DEFAULT_ATOL, DEFAULT_RTOL, FitSolver, NonProbabilisticFit, NonProbabilisticFitWithJacobian,
};
use crate::numerical::init_routines::stack::{Stack, StackWithJacobian};
use log::info;
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};

pub const SECTION: &str = "initialization";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum RoutineKind {
    Stack,
    StackWithJacobian,
    NonProbabilisticFit,
    NonProbabilisticFitWithJacobian,
    ForwardMode,
    ForwardModeJVP,
    ReverseMode,
    TaylorMode,
}

impl RoutineKind {
    /// Document keys understood by this routine besides `routine`.
    pub fn accepted_keys(&self) -> &'static [&'static str] {
        match self {
            RoutineKind::Stack | RoutineKind::StackWithJacobian => &["scale_cholesky"],
            RoutineKind::NonProbabilisticFit | RoutineKind::NonProbabilisticFitWithJacobian => {
                &["solver", "rtol", "atol", "dt", "num_samples", "max_steps"]
            }
            RoutineKind::TaylorMode => &["max_order"],
            RoutineKind::ForwardMode | RoutineKind::ForwardModeJVP | RoutineKind::ReverseMode => &[],
        }
    }
}

/// Routine with default options.
pub fn build_routine(kind: RoutineKind) -> Box<dyn InitializationRoutine> {
    match kind {
        RoutineKind::Stack => Box::new(Stack::new()),
        RoutineKind::StackWithJacobian => Box::new(StackWithJacobian::new()),
        RoutineKind::NonProbabilisticFit => Box::new(NonProbabilisticFit::default()),
        RoutineKind::NonProbabilisticFitWithJacobian => Box::new(NonProbabilisticFitWithJacobian::default()),
        RoutineKind::ForwardMode => Box::new(ForwardMode),
        RoutineKind::ForwardModeJVP => Box::new(ForwardModeJVP),
        RoutineKind::ReverseMode => Box::new(ReverseMode),
        RoutineKind::TaylorMode => Box::new(TaylorMode::new()),
    }
}

pub fn recommended_routine(num_derivatives: usize, has_jacobian: bool, autodiff_available: bool) -> RoutineKind {
    match num_derivatives {
        0 | 1 => RoutineKind::Stack,
        2 if has_jacobian || autodiff_available => RoutineKind::StackWithJacobian,
        2 => RoutineKind::NonProbabilisticFit,
        q if q > 5 && autodiff_available => RoutineKind::TaylorMode,
        _ if has_jacobian => RoutineKind::NonProbabilisticFitWithJacobian,
        _ => RoutineKind::NonProbabilisticFit,
    }
}

fn single_value<'a>(section: &'a SectionMap, key: &str) -> Result<Option<&'a Value>, InitError> {
    match section.get(key).map(|values| values.as_slice()) {
        None => Ok(None),
        Some([value]) => Ok(Some(value)),
        Some(values) => Err(InitError::InvalidConfiguration(format!(
            "'{}' expects a single value, got {}",
            key,
            values.len()
        ))),
    }
}

fn float_option(section: &SectionMap, key: &str) -> Result<Option<f64>, InitError> {
    match single_value(section, key)? {
        None => Ok(None),
        Some(value) => value.as_float().map(Some).ok_or_else(|| {
            InitError::InvalidConfiguration(format!("'{}' must be a number, got '{}'", key, value))
        }),
    }
}

fn count_option(section: &SectionMap, key: &str) -> Result<Option<usize>, InitError> {
    match single_value(section, key)? {
        None => Ok(None),
        Some(value) => match value.as_integer() {
            Some(n) if n > 0 => Ok(Some(n as usize)),
            _ => Err(InitError::InvalidConfiguration(format!(
                "'{}' must be a positive integer, got '{}'",
                key, value
            ))),
        },
    }
}

fn name_option<T: FromStr>(section: &SectionMap, key: &str) -> Result<Option<T>, InitError> {
    match single_value(section, key)? {
        None => Ok(None),
        Some(value) => value
            .as_string()
            .and_then(|s| T::from_str(s).ok())
            .map(Some)
            .ok_or_else(|| InitError::InvalidConfiguration(format!("unknown {} '{}'", key, value))),
    }
}

macro_rules! fit_from_section {
    ($routine:ty, $section:expr, $default_solver:expr) => {{
        let section = $section;
        let solver = name_option::<FitSolver>(section, "solver")?.unwrap_or($default_solver);
        let rtol = float_option(section, "rtol")?.unwrap_or(DEFAULT_RTOL);
        let atol = float_option(section, "atol")?.unwrap_or(DEFAULT_ATOL);
        let mut routine = <$routine>::new(solver, rtol, atol)?;
        if let Some(dt) = float_option(section, "dt")? {
            routine = routine.with_dt(dt)?;
        }
        if let Some(num_samples) = count_option(section, "num_samples")? {
            routine = routine.with_num_samples(num_samples)?;
        }
        if let Some(max_steps) = count_option(section, "max_steps")? {
            routine = routine.with_max_steps(max_steps)?;
        }
        Box::new(routine) as Box<dyn InitializationRoutine>
    }};
}

/// Builds a routine from an already parsed `initialization` section.
pub fn routine_from_section(section: &SectionMap) -> Result<Box<dyn InitializationRoutine>, InitError> {
    let kind: RoutineKind = name_option(section, "routine")?
        .ok_or_else(|| InitError::InvalidConfiguration("missing key 'routine'".to_string()))?;
    let accepted = kind.accepted_keys();
    let mut keys: Vec<&String> = section.keys().collect();
    keys.sort();
    for key in keys {
        if key != "routine" && !accepted.contains(&key.as_str()) {
            return Err(InitError::InvalidConfiguration(format!(
                "key '{}' is not recognized by {}",
                key, kind
            )));
        }
    }
    let routine: Box<dyn InitializationRoutine> = match kind {
        RoutineKind::Stack => match float_option(section, "scale_cholesky")? {
            Some(s) => Box::new(Stack::with_scale_cholesky(s)?),
            None => Box::new(Stack::new()),
        },
        RoutineKind::StackWithJacobian => match float_option(section, "scale_cholesky")? {
            Some(s) => Box::new(StackWithJacobian::with_scale_cholesky(s)?),
            None => Box::new(StackWithJacobian::new()),
        },
        RoutineKind::NonProbabilisticFit => {
            fit_from_section!(NonProbabilisticFit, section, FitSolver::RK45)
        }
        RoutineKind::NonProbabilisticFitWithJacobian => {
            fit_from_section!(NonProbabilisticFitWithJacobian, section, FitSolver::Radau)
        }
        RoutineKind::TaylorMode => match count_option(section, "max_order")? {
            Some(max_order) => Box::new(TaylorMode::with_max_order(max_order)),
            None => Box::new(TaylorMode::new()),
        },
        other => build_routine(other),
    };
    info!("configured initialization routine {}", routine.name());
    Ok(routine)
}

/// Reads the `initialization` section of a task document.
pub fn routine_from_document(text: &str) -> Result<Box<dyn InitializationRoutine>, InitError> {
    let section = parse_section_as(text, SECTION).map_err(InitError::InvalidConfiguration)?;
    routine_from_section(&section)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_build_every_kind() {
        for kind in RoutineKind::iter() {
            assert_eq!(build_routine(kind).name(), kind.to_string());
        }
        assert!(RoutineKind::from_str("Euler").is_err());
    }

    #[test]
    fn test_recommendations() {
        assert_eq!(recommended_routine(1, false, false), RoutineKind::Stack);
        assert_eq!(recommended_routine(2, true, false), RoutineKind::StackWithJacobian);
        assert_eq!(recommended_routine(2, false, false), RoutineKind::NonProbabilisticFit);
        assert_eq!(
            recommended_routine(4, true, true),
            RoutineKind::NonProbabilisticFitWithJacobian
        );
        assert_eq!(recommended_routine(5, false, false), RoutineKind::NonProbabilisticFit);
        assert_eq!(recommended_routine(8, true, true), RoutineKind::TaylorMode);
        assert_eq!(
            recommended_routine(8, true, false),
            RoutineKind::NonProbabilisticFitWithJacobian
        );
    }

    #[test]
    fn test_routine_from_document() {
        let routine = routine_from_document(
            "initialization\nroutine: NonProbabilisticFitWithJacobian\nsolver: Radau\nrtol: 1e-6\nnum_samples: 7",
        )
        .unwrap();
        assert_eq!(routine.name(), "NonProbabilisticFitWithJacobian");
        let routine = routine_from_document("initialization routine: TaylorMode max_order: 12").unwrap();
        assert!(routine.is_exact());
        assert!(routine_from_document("initialization routine: Stack scale_cholesky: 1000").is_ok());
    }

    #[test]
    fn test_invalid_documents() {
        let cases = [
            "initialization routine: Stack solver: BDF",
            "initialization routine: NonProbabilisticFit rtol: -1e-6",
            "initialization routine: NonProbabilisticFit rtol: small",
            "initialization routine: NonProbabilisticFit solver: LSODA",
            "initialization routine: NonProbabilisticFit num_samples: 0",
            "initialization routine: NonProbabilisticFit dt: 1e-2, 1e-3",
            "initialization routine: Simpson",
            "initialization solver: BDF",
            "problem routine: Stack",
            "initialization routine: ForwardMode color: red",
        ];
        for doc in cases {
            assert!(
                matches!(routine_from_document(doc), Err(InitError::InvalidConfiguration(_))),
                "{}",
                doc
            );
        }
    }
}
