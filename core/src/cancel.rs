use std::sync::{
  atomic::{AtomicU64, Ordering},
  Arc,
};

/// Monotonic counter shared by the coordinator and the sweeps it starts.
///
/// Bumping the generation supersedes every token handed out before the bump.
#[derive(Debug, Clone, Default)]
pub struct Generation {
  current: Arc<AtomicU64>,
}

impl Generation {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn current(&self) -> u64 {
    self.current.load(Ordering::SeqCst)
  }

  /// Supersede all outstanding tokens. Returns the new generation.
  pub fn bump(&self) -> u64 {
    self.current.fetch_add(1, Ordering::SeqCst) + 1
  }

  pub fn token(&self) -> GenerationToken {
    GenerationToken {
      current: self.current.clone(),
      expected: self.current(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct GenerationToken {
  current: Arc<AtomicU64>,
  expected: u64,
}

impl GenerationToken {
  /// A token nobody can supersede.
  pub fn detached() -> Self {
    Self {
      current: Arc::new(AtomicU64::new(0)),
      expected: 0,
    }
  }

  pub fn is_current(&self) -> bool {
    self.current.load(Ordering::SeqCst) == self.expected
  }
}

/// Polls a token every `every` iterations of a sweep.
pub(crate) struct CancelCheck<'a> {
  token: &'a GenerationToken,
  every: usize,
  n: usize,
}

impl<'a> CancelCheck<'a> {
  pub(crate) fn new(token: &'a GenerationToken, every: usize) -> Self {
    Self {
      token,
      every: every.max(1),
      n: 0,
    }
  }

  /// Returns false once the token has been superseded.
  pub(crate) fn tick(&mut self) -> bool {
    self.n += 1;
    if self.n % self.every == 0 {
      return self.token.is_current();
    }
    true
  }
}
