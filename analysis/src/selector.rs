/// Indices of the games to analyse out of a batch of `len`.
///
/// All of them when `len <= max_games`; otherwise `max_games` evenly spaced
/// indices (`floor(i * len / max_games)`), preserving batch order.
pub fn selected_indices(len: usize, max_games: usize) -> Vec<usize> {
    if len <= max_games {
        return (0..len).collect();
    }
    (0..max_games).map(|i| i * len / max_games).collect()
}

/// Pick an evenly time-distributed subset of `games`.
pub fn select_games<T>(games: &[T], max_games: usize) -> Vec<&T> {
    selected_indices(games.len(), max_games)
        .into_iter()
        .map(|i| &games[i])
        .collect()
}
