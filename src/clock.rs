// Tests need to move time forward to watch keys activate and expire, so the real clock is
// swapped out for a frozen one under cfg(test).

#[cfg(not(test))]
mod real_clock {
	use chrono::{DateTime, Utc};

	#[derive(Clone, Debug, Default)]
	pub(crate) struct Clock;

	impl Clock {
		pub(crate) fn now(&self) -> DateTime<Utc> {
			Utc::now()
		}
	}
}


#[cfg(not(test))]
pub(crate) use real_clock::Clock;
#[cfg(test)]
pub(crate) use test_clock::Clock;
