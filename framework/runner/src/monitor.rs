use stampede_core::prelude::DelegatedShutdownListener;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Monitor the resource usage of this process and report high usage.
///
/// Note that this won't stop the run, it only warns the user that a busy coordinator can delay
/// shape ticks and statistics samples.
///
/// The CPU usage for the process is collected every [sysinfo::MINIMUM_CPU_UPDATE_INTERVAL] and
/// checked. If it is above 10% with respect to the number of cores then a warning is logged.
pub(crate) fn start_monitor(mut shutdown_listener: DelegatedShutdownListener) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let this_process_pid = Pid::from_u32(std::process::id());
            let mut sys = System::new();

            sys.refresh_cpu_all();
            let cpu_count = sys.cpus().len().max(1);

            loop {
                if shutdown_listener.should_shutdown() {
                    break;
                }

                sys.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[this_process_pid]),
                    true,
                    ProcessRefreshKind::nothing().with_cpu(),
                );

                match sys.process(this_process_pid) {
                    Some(process) => {
                        let usage = cpu_share(process.cpu_usage(), cpu_count);
                        if usage > 10.0 {
                            log::warn!("High CPU usage detected. The runner is using {usage:.2}% of the CPU, with {cpu_count} available cores");
                        }
                    }
                    None => {
                        log::debug!("No process information available, stopping the monitor");
                        break;
                    }
                }

                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            }
        })?;

    Ok(())
}

/// Process CPU usage, reported per core, as a share of all cores.
fn cpu_share(process_usage: f32, cpu_count: usize) -> f32 {
    (process_usage / (cpu_count * 100) as f32) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_is_relative_to_all_cores() {
        assert_eq!(25.0, cpu_share(100.0, 4));
        assert_eq!(5.0, cpu_share(40.0, 8));
    }
}
