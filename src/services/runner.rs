//! # VR 시나리오 실행기
//!
//! 외부 VR 런타임을 시작하는 방법을 `ScenarioRunner` 트레이트 뒤로 숨깁니다.
//! 핸드셰이크 로직은 "시작을 요청하고, 나중에 끝났다는 신호를 받는다"만 알고,
//! 실제로 프로세스를 띄우는지 다른 서비스에 메시지를 보내는지는 모릅니다.
//!
//! - `ProcessScenarioRunner`: 설정된 실행 파일을 자식 프로세스로 띄웁니다.
//!   인자는 `<token> <scenario name> <patient code>` 순서입니다.
//! - 테스트에서는 `test_support::StubRunner`로 교체합니다.

use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::oneshot;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("VR executable is not configured")]
    NotConfigured,

    #[error("failed to start VR process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("VR process exited unsuccessfully: {0}")]
    ExitStatus(String),
}

/// 실행된 시나리오에 대한 핸들
///
/// `exit`는 런타임이 끝나면 결과를 한 번 받습니다. 정상 종료가 아니면
/// 핸드셰이크가 세션을 Interrupted로 돌립니다.
#[derive(Debug)]
pub struct LaunchHandle {
    pub pid: Option<u32>,
    pub exit: oneshot::Receiver<Result<(), LaunchError>>,
}

pub trait ScenarioRunner: Send + Sync {
    fn start(
        &self,
        token: &str,
        scenario_name: &str,
        patient_identifier: &str,
    ) -> Result<LaunchHandle, LaunchError>;
}

#[derive(Debug, Clone, Default)]
pub struct ProcessScenarioRunner {
    executable: Option<String>,
    working_dir: Option<String>,
}

impl ProcessScenarioRunner {
    pub fn new(executable: Option<String>, working_dir: Option<String>) -> Self {
        Self {
            executable,
            working_dir,
        }
    }
}

impl ScenarioRunner for ProcessScenarioRunner {
    fn start(
        &self,
        token: &str,
        scenario_name: &str,
        patient_identifier: &str,
    ) -> Result<LaunchHandle, LaunchError> {
        let executable = self.executable.as_ref().ok_or(LaunchError::NotConfigured)?;

        let mut command = Command::new(executable);
        command
            .arg(token)
            .arg(scenario_name)
            .arg(patient_identifier)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        let pid = child.id();
        tracing::info!(?pid, executable = %executable, "VR process spawned");

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = match child.wait().await {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(LaunchError::ExitStatus(status.to_string())),
                Err(e) => Err(LaunchError::Spawn(e)),
            };
            // 받는 쪽이 이미 사라졌으면 알릴 곳이 없음
            let _ = tx.send(result);
        });

        Ok(LaunchHandle { pid, exit: rx })
    }
}
