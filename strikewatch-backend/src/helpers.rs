use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::config::split_list;

pub fn now() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs() as i64)
    .unwrap_or_default()
}

/// Resolve the reply format from per-command flags.
/// An explicit text request wins over an image request.
pub fn prefers_image(image: Option<bool>, text: Option<bool>, default: bool) -> bool {
  if text == Some(true) {
    return false;
  }
  image.unwrap_or(default)
}

/// What a `batch-query` invocation asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchAction {
  /// Query these addresses, or the saved list when empty
  Query(Vec<String>),
  List,
  Add(String),
  /// 1-based position in the saved list
  Remove(usize),
  Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchArgs {
  pub action: BatchAction,
  pub image: Option<bool>,
  pub text: Option<bool>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
  #[error("`{0}` needs a value")]
  MissingValue(&'static str),

  #[error("`{0}` is not a list position")]
  InvalidIndex(String),
}

/// Parse the free-form `batch-query` arguments.
///
/// Words are separated by spaces or commas. `list`, `add <address>`,
/// `remove <n>` and `clear` (or their `--long`/`-x` forms) manage the saved
/// list, `image` and `text` pick the reply format, and every other word is an
/// address to query. The first list-management word wins.
pub fn parse_batch_args(input: &str) -> Result<BatchArgs, ArgsError> {
  let mut words = split_list(input).into_iter();
  let mut addresses = Vec::new();
  let mut action = None;
  let mut image = None;
  let mut text = None;

  while let Some(word) = words.next() {
    match word.trim_start_matches('-').to_ascii_lowercase().as_str() {
      "list" | "l" => {
        action.get_or_insert(BatchAction::List);
      }
      "clear" | "c" => {
        action.get_or_insert(BatchAction::Clear);
      }
      "add" | "a" => {
        let address = words.next().ok_or(ArgsError::MissingValue("add"))?;
        action.get_or_insert(BatchAction::Add(address));
      }
      "remove" | "r" => {
        let raw = words.next().ok_or(ArgsError::MissingValue("remove"))?;
        let index = raw
          .parse::<usize>()
          .ok()
          .filter(|index| *index > 0)
          .ok_or(ArgsError::InvalidIndex(raw))?;
        action.get_or_insert(BatchAction::Remove(index));
      }
      "image" | "i" => image = Some(true),
      "text" | "t" => text = Some(true),
      _ => addresses.push(word),
    }
  }

  Ok(BatchArgs {
    action: action.unwrap_or(BatchAction::Query(addresses)),
    image,
    text,
  })
}
