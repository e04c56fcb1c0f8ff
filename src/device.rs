use candle_core::Device;
use candle_core::utils::{cuda_is_available, metal_is_available};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Metal,
    Cuda,
    Cpu,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metal => "metal",
            Self::Cuda => "cuda",
            Self::Cpu => "cpu",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accelerator candidate in the selection chain.
pub trait DeviceProbe {
    fn kind(&self) -> DeviceKind;
    fn is_available(&self) -> bool;
    fn open(&self) -> candle_core::Result<Device>;
}

pub struct MetalProbe;

impl DeviceProbe for MetalProbe {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Metal
    }

    fn is_available(&self) -> bool {
        metal_is_available()
    }

    fn open(&self) -> candle_core::Result<Device> {
        Device::new_metal(0)
    }
}

pub struct CudaProbe;

impl DeviceProbe for CudaProbe {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Cuda
    }

    fn is_available(&self) -> bool {
        cuda_is_available()
    }

    fn open(&self) -> candle_core::Result<Device> {
        Device::new_cuda(0)
    }
}

/// The accelerator chain in priority order. CPU is implicit and always last.
pub fn default_probes() -> Vec<Box<dyn DeviceProbe>> {
    vec![Box::new(MetalProbe), Box::new(CudaProbe)]
}

#[derive(Debug, Clone)]
pub struct SelectedDevice {
    pub kind: DeviceKind,
    pub device: Device,
}

impl SelectedDevice {
    pub fn cpu() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            device: Device::Cpu,
        }
    }
}

/// Picks the execution device. `cpu_only` skips every accelerator probe.
pub fn choose_device(cpu_only: bool, probes: &[Box<dyn DeviceProbe>]) -> SelectedDevice {
    if cpu_only {
        tracing::info!("CPU-only mode requested, running on CPU");
        return SelectedDevice::cpu();
    }
    select_device(probes)
}

/// Returns the first probe that is available and opens, falling back to CPU.
pub fn select_device(probes: &[Box<dyn DeviceProbe>]) -> SelectedDevice {
    for probe in probes {
        let kind = probe.kind();
        if !probe.is_available() {
            tracing::debug!(device = %kind, "Device not available");
            continue;
        }
        match probe.open() {
            Ok(device) => {
                tracing::info!(device = %kind, "Using {kind} acceleration");
                return SelectedDevice { kind, device };
            }
            Err(e) => {
                tracing::warn!(device = %kind, error = %e, "Device available but failed to open");
            }
        }
    }

    tracing::info!(
        "No accelerator available, running on CPU. To run on GPU, build with `--features cuda`"
    );
    SelectedDevice::cpu()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAvailability {
    pub metal: bool,
    pub cuda: bool,
    pub cpu: bool,
}

pub fn availability() -> DeviceAvailability {
    DeviceAvailability {
        metal: metal_is_available(),
        cuda: cuda_is_available(),
        cpu: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProbe {
        kind: DeviceKind,
        available: bool,
        opens: bool,
        opened: Arc<AtomicUsize>,
    }

    impl FakeProbe {
        fn boxed(
            kind: DeviceKind,
            available: bool,
            opens: bool,
            opened: &Arc<AtomicUsize>,
        ) -> Box<dyn DeviceProbe> {
            Box::new(Self {
                kind,
                available,
                opens,
                opened: opened.clone(),
            })
        }
    }

    impl DeviceProbe for FakeProbe {
        fn kind(&self) -> DeviceKind {
            self.kind
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn open(&self) -> candle_core::Result<Device> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if self.opens {
                Ok(Device::Cpu)
            } else {
                Err(candle_core::Error::Msg(format!("{} driver missing", self.kind)))
            }
        }
    }

    #[test]
    fn first_available_probe_wins() {
        let opened = Arc::new(AtomicUsize::new(0));
        let probes = vec![
            FakeProbe::boxed(DeviceKind::Metal, true, true, &opened),
            FakeProbe::boxed(DeviceKind::Cuda, true, true, &opened),
        ];
        let selected = select_device(&probes);
        assert_eq!(selected.kind, DeviceKind::Metal);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unavailable_probe_is_not_opened() {
        let opened = Arc::new(AtomicUsize::new(0));
        let probes = vec![
            FakeProbe::boxed(DeviceKind::Metal, false, true, &opened),
            FakeProbe::boxed(DeviceKind::Cuda, true, true, &opened),
        ];
        let selected = select_device(&probes);
        assert_eq!(selected.kind, DeviceKind::Cuda);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_probe_falls_through() {
        let opened = Arc::new(AtomicUsize::new(0));
        let probes = vec![
            FakeProbe::boxed(DeviceKind::Metal, true, false, &opened),
            FakeProbe::boxed(DeviceKind::Cuda, true, true, &opened),
        ];
        assert_eq!(select_device(&probes).kind, DeviceKind::Cuda);
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cpu_fallback_never_errors() {
        let opened = Arc::new(AtomicUsize::new(0));
        let probes = vec![
            FakeProbe::boxed(DeviceKind::Metal, true, false, &opened),
            FakeProbe::boxed(DeviceKind::Cuda, false, false, &opened),
        ];
        let selected = select_device(&probes);
        assert_eq!(selected.kind, DeviceKind::Cpu);
        assert!(selected.device.is_cpu());

        assert_eq!(select_device(&[]).kind, DeviceKind::Cpu);
    }

    #[test]
    fn cpu_only_skips_every_accelerator() {
        let opened = Arc::new(AtomicUsize::new(0));
        let probes = vec![
            FakeProbe::boxed(DeviceKind::Metal, true, true, &opened),
            FakeProbe::boxed(DeviceKind::Cuda, true, true, &opened),
        ];
        assert_eq!(choose_device(true, &probes).kind, DeviceKind::Cpu);
        assert_eq!(opened.load(Ordering::SeqCst), 0);

        assert_eq!(choose_device(false, &probes).kind, DeviceKind::Metal);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cpu_is_always_reported_available() {
        assert!(availability().cpu);
    }
}
