//! Hook scripts and validation checks
//!
//! Hooks (`on_change`, `value_changed`, `init`) are short statement lists:
//!
//! ```text
//! cancel if value < 0
//! set #param_finish = value / 10 if #param_auto
//! hide #param_angle if value == 0; gray #param_feed
//! ```
//!
//! Validation blocks hold one `CONDITION :: MESSAGE` check per line.

use crate::expr::{self, EvalError, Expr, Parser, Scope, Token};

/// What a statement acts on
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// The value being proposed to `set_value`
    Proposed,
    /// Another parameter, by call token
    Param(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Cancel,
    Set(Target, Expr),
    Hide(Target),
    Show(Target),
    Gray(Target),
    Ungray(Target),
}

#[derive(Debug, Clone, PartialEq)]
struct Statement {
    action: Action,
    condition: Option<Expr>,
}

/// Side effects requested by a hook, applied by the owning feature.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SetParam(String, String),
    Hide(String),
    Show(String),
    Gray(String),
    Ungray(String),
}

/// Result of running a hook
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookOutcome {
    pub cancelled: bool,
    /// Replacement for the proposed value, if the hook set one
    pub proposed: Option<String>,
    pub effects: Vec<Effect>,
}

/// A parsed hook script
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hook {
    statements: Vec<Statement>,
}

fn statements(src: &str) -> impl Iterator<Item = &str> {
    src.lines()
        .flat_map(|line| line.split(';'))
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with("//"))
}

fn target(parser: &mut Parser<'_>) -> Result<Target, EvalError> {
    match parser.advance().cloned() {
        Some(Token::Hash(token)) => Ok(Target::Param(token)),
        Some(Token::Ident(word)) if word == "value" => Ok(Target::Proposed),
        Some(other) => Err(EvalError::UnexpectedToken(other.to_string())),
        None => Err(EvalError::UnexpectedToken("end of statement".to_string())),
    }
}

fn parse_statement(src: &str) -> Result<Statement, EvalError> {
    let tokens = expr::tokenize(src)?;
    let mut parser = Parser::new(&tokens);
    let action = if parser.eat_word("cancel") {
        Action::Cancel
    } else if parser.eat_word("set") {
        let t = target(&mut parser)?;
        if !parser.eat_op("=") {
            return Err(parser.unexpected());
        }
        Action::Set(t, parser.expression()?)
    } else if parser.eat_word("hide") {
        Action::Hide(target(&mut parser)?)
    } else if parser.eat_word("show") {
        Action::Show(target(&mut parser)?)
    } else if parser.eat_word("gray") {
        Action::Gray(target(&mut parser)?)
    } else if parser.eat_word("ungray") {
        Action::Ungray(target(&mut parser)?)
    } else {
        return Err(parser.unexpected());
    };
    let condition = if parser.eat_word("if") {
        Some(parser.expression()?)
    } else {
        None
    };
    if !parser.at_end() {
        return Err(parser.unexpected());
    }
    Ok(Statement { action, condition })
}

impl Hook {
    pub fn parse(src: &str) -> Result<Self, EvalError> {
        let statements = statements(src)
            .map(parse_statement)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { statements })
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Run all statements; stops at the first `cancel` that fires.
    pub fn run(&self, scope: &mut dyn Scope) -> Result<HookOutcome, EvalError> {
        let mut outcome = HookOutcome::default();
        for stmt in &self.statements {
            if let Some(cond) = &stmt.condition {
                if !expr::eval(cond, scope)?.truthy() {
                    continue;
                }
            }
            let token = |t: &Target| match t {
                Target::Param(tok) => Some(tok.clone()),
                Target::Proposed => None,
            };
            match &stmt.action {
                Action::Cancel => {
                    outcome.cancelled = true;
                    return Ok(outcome);
                }
                Action::Set(Target::Proposed, e) => {
                    outcome.proposed = Some(expr::eval(e, scope)?.to_string());
                }
                Action::Set(Target::Param(tok), e) => {
                    let v = expr::eval(e, scope)?.to_string();
                    outcome.effects.push(Effect::SetParam(tok.clone(), v));
                }
                Action::Hide(t) => outcome.effects.extend(token(t).map(Effect::Hide)),
                Action::Show(t) => outcome.effects.extend(token(t).map(Effect::Show)),
                Action::Gray(t) => outcome.effects.extend(token(t).map(Effect::Gray)),
                Action::Ungray(t) => outcome.effects.extend(token(t).map(Effect::Ungray)),
            }
        }
        Ok(outcome)
    }
}

/// One line of a validation block
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub condition: String,
    pub message: String,
}

/// Split a validation block (parameter tokens already substituted) into checks
pub fn parse_checks(src: &str) -> Vec<Check> {
    src.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("//"))
        .map(|line| match line.split_once("::") {
            Some((cond, msg)) => Check {
                condition: cond.trim().to_string(),
                message: msg.trim().to_string(),
            },
            None => Check {
                condition: line.to_string(),
                message: format!("check failed: {}", line),
            },
        })
        .collect()
}
