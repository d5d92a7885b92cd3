/// Available commands and autocomplete logic
use crate::api::MAX_RANGE_DAYS;

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  /// Argument placeholder shown in the palette, empty when none
  pub args: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "refresh",
    aliases: &["r", "reload"],
    args: "",
    description: "Fetch live data now",
  },
  Command {
    name: "auto",
    aliases: &["a", "autorefresh"],
    args: "",
    description: "Toggle auto-refresh",
  },
  Command {
    name: "range",
    aliases: &["days", "d"],
    args: "<days>",
    description: "Show the last N days",
  },
  Command {
    name: "clear-cache",
    aliases: &["clear", "cc"],
    args: "",
    description: "Drop every cached payload",
  },
  Command {
    name: "stats",
    aliases: &["s", "cache"],
    args: "",
    description: "Show cache statistics",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    args: "",
    description: "Exit shoplens",
  },
];

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  Refresh,
  ToggleAuto,
  Range(u32),
  ClearCache,
  Stats,
  Quit,
}

/// Parse a command line such as `range 30`, resolving aliases.
pub fn parse(input: &str) -> Result<Action, String> {
  let mut parts = input.split_whitespace();
  let word = parts.next().unwrap_or_default().to_lowercase();
  let arg = parts.next();

  let command = COMMANDS
    .iter()
    .find(|c| c.name == word || c.aliases.contains(&word.as_str()))
    .ok_or_else(|| format!("Unknown command: {}", word))?;

  match command.name {
    "refresh" => Ok(Action::Refresh),
    "auto" => Ok(Action::ToggleAuto),
    "range" => {
      let out_of_range = || format!("Days must be between 1 and {}", MAX_RANGE_DAYS);
      let days = arg
        .ok_or_else(|| "Usage: range <days>".to_string())?
        .parse::<u32>()
        .map_err(|_| out_of_range())?;
      if !(1..=MAX_RANGE_DAYS).contains(&days) {
        return Err(out_of_range());
      }
      Ok(Action::Range(days))
    }
    "clear-cache" => Ok(Action::ClearCache),
    "stats" => Ok(Action::Stats),
    _ => Ok(Action::Quit),
  }
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  // Only the command word is completed
  let input_lower = input
    .split_whitespace()
    .next()
    .unwrap_or_default()
    .to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0)); // Highest priority
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
    }
  }

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}
