use std::sync::OnceLock;

/// Which authenticated encryption suites the current host can run well.
///
/// "Modern" means the CPU has hardware support for both AES and carry-less multiplication, so
/// AES-GCM runs in constant time at full speed.  "Legacy" means the CPU can be probed but lacks
/// those instructions, in which case AES-CBC+HMAC is preferred.  If we can't even ask the CPU
/// what it supports, we report [`PlatformCapability::NoNativeSuite`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlatformCapability {
	ModernSuiteAvailable,
	LegacySuiteAvailable,
	NoNativeSuite,
}

static DETECTED: OnceLock<PlatformCapability> = OnceLock::new();

impl PlatformCapability {
	/// Probe the host, once per process.
	///
	/// The answer reflects what the hardware supports, so it can't change without a restart,
	/// and subsequent calls return the cached value.
	pub fn detect() -> Self {
		*DETECTED.get_or_init(|| {
			let capability = probe();
			tracing::debug!(?capability, "Detected platform capability");
			capability
		})
	}
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn probe() -> PlatformCapability {
	if std::arch::is_x86_feature_detected!("aes")
		&& std::arch::is_x86_feature_detected!("pclmulqdq")
	{
		PlatformCapability::ModernSuiteAvailable
	} else {
		PlatformCapability::LegacySuiteAvailable
	}
}

#[cfg(target_arch = "aarch64")]
fn probe() -> PlatformCapability {
	if std::arch::is_aarch64_feature_detected!("aes")
		&& std::arch::is_aarch64_feature_detected!("pmull")
	{
		PlatformCapability::ModernSuiteAvailable
	} else {
		PlatformCapability::LegacySuiteAvailable
	}
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
fn probe() -> PlatformCapability {
	PlatformCapability::NoNativeSuite
}
