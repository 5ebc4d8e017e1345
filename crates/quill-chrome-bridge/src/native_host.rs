//! Native Messaging Host 安装与平台路径
//!
//! 浏览器通过 manifest 中登记的 wrapper 脚本拉起 Relay Server 进程。
//! 这里负责平台探测、manifest/wrapper 的生成与安装,以及两端共用的
//! 传输地址推导 —— 地址必须是平台与用户名的确定性函数,Server 与
//! Client 才能在无协调的情况下找到彼此。

use std::path::PathBuf;

use thiserror::Error;
use tokio::fs;

/// 浏览器扩展 ID
pub const EXTENSION_ID: &str = "lkbfjmpgonccafeojhkbmlemjdpleipj";

/// Native Host 名称
pub const NATIVE_HOST_NAME: &str = "com.quill.browser_extension";

/// 扩展安装指引 URL
pub const INSTALL_URL: &str = "https://quill.sh/chrome";

/// 平台类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
    Wsl,
    Unknown,
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Chrome integration is not supported on this platform")]
    Unsupported,

    #[error("Failed to locate the native messaging hosts directory")]
    NoHostsDirectory,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),

    #[cfg(windows)]
    #[error("Registry error: {0}")]
    Registry(String),
}

/// 获取当前平台
pub fn get_platform() -> Platform {
    #[cfg(target_os = "macos")]
    {
        Platform::MacOS
    }

    #[cfg(target_os = "windows")]
    {
        Platform::Windows
    }

    #[cfg(target_os = "linux")]
    {
        // WSL 下 Chrome 跑在 Windows 侧,路径约定不同
        if let Ok(release) = std::fs::read_to_string("/proc/version") {
            if release.to_lowercase().contains("microsoft")
                || release.to_lowercase().contains("wsl")
            {
                return Platform::Wsl;
            }
        }
        Platform::Linux
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        Platform::Unknown
    }
}

/// 获取 Chrome Native Messaging Hosts 目录
pub fn native_hosts_directory() -> Option<PathBuf> {
    let home = dirs::home_dir()?;

    match get_platform() {
        Platform::MacOS => Some(
            home.join("Library")
                .join("Application Support")
                .join("Google")
                .join("Chrome")
                .join("NativeMessagingHosts"),
        ),
        Platform::Linux => Some(
            home.join(".config")
                .join("google-chrome")
                .join("NativeMessagingHosts"),
        ),
        Platform::Windows => {
            let app_data = std::env::var("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home.join("AppData").join("Roaming"));
            Some(app_data.join("Quill").join("ChromeNativeHost"))
        }
        _ => None,
    }
}

/// 推导传输地址
///
/// 固定命名空间 + 用户名,Server 与 Client 各自独立计算出同一个值。
pub fn socket_path() -> String {
    let username = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let socket_name = format!("quill-chrome-bridge-{username}");

    #[cfg(windows)]
    return format!("\\\\.\\pipe\\{socket_name}");

    #[cfg(not(windows))]
    return std::env::temp_dir()
        .join(socket_name)
        .to_string_lossy()
        .to_string();
}

/// 生成 Native Host Manifest
pub fn generate_manifest(wrapper_script_path: &str) -> serde_json::Value {
    serde_json::json!({
        "name": NATIVE_HOST_NAME,
        "description": "Quill Browser Extension Native Host",
        "path": wrapper_script_path,
        "type": "stdio",
        "allowed_origins": [
            format!("chrome-extension://{EXTENSION_ID}/")
        ]
    })
}

/// 生成 wrapper 启动脚本
pub fn generate_wrapper_script(command: &str) -> String {
    match get_platform() {
        Platform::Windows => format!(
            "@echo off\nREM Chrome native host wrapper script\n{command}\n"
        ),
        _ => format!(
            "#!/bin/bash\n# Chrome native host wrapper script\nexec {command}\n"
        ),
    }
}

/// 当前平台是否支持 Chrome 集成
pub fn is_supported() -> bool {
    matches!(
        get_platform(),
        Platform::MacOS | Platform::Linux | Platform::Windows
    )
}

/// manifest 是否已安装
pub async fn is_configured() -> bool {
    let hosts_dir = match native_hosts_directory() {
        Some(d) => d,
        None => return false,
    };

    let manifest_path = hosts_dir.join(format!("{NATIVE_HOST_NAME}.json"));
    fs::metadata(&manifest_path).await.is_ok()
}

/// 安装结果
#[derive(Debug)]
pub struct SetupResult {
    pub manifest_path: PathBuf,
    pub wrapper_path: PathBuf,
}

/// 安装 Native Host:写入 wrapper 脚本与 manifest
///
/// `command` 是 wrapper 最终执行的命令行(通常为
/// `<当前可执行文件> host`)。
pub async fn setup_native_host(command: &str) -> Result<SetupResult, InstallError> {
    if !is_supported() {
        return Err(InstallError::Unsupported);
    }

    let hosts_dir = native_hosts_directory().ok_or(InstallError::NoHostsDirectory)?;
    fs::create_dir_all(&hosts_dir).await?;

    let wrapper_ext = if get_platform() == Platform::Windows {
        "bat"
    } else {
        "sh"
    };
    let wrapper_path = hosts_dir.join(format!("{NATIVE_HOST_NAME}.{wrapper_ext}"));
    fs::write(&wrapper_path, generate_wrapper_script(command)).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        std::fs::set_permissions(&wrapper_path, perms)?;
    }

    let manifest_path = hosts_dir.join(format!("{NATIVE_HOST_NAME}.json"));
    let manifest = generate_manifest(&wrapper_path.to_string_lossy());
    fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?).await?;

    #[cfg(windows)]
    setup_windows_registry(&manifest_path)?;

    tracing::info!("Native host manifest installed at {}", manifest_path.display());

    Ok(SetupResult {
        manifest_path,
        wrapper_path,
    })
}

/// 卸载 Native Host
pub async fn uninstall_native_host() -> Result<(), InstallError> {
    let hosts_dir = native_hosts_directory().ok_or(InstallError::NoHostsDirectory)?;

    let manifest_path = hosts_dir.join(format!("{NATIVE_HOST_NAME}.json"));
    if fs::metadata(&manifest_path).await.is_ok() {
        fs::remove_file(&manifest_path).await?;
    }

    let wrapper_ext = if get_platform() == Platform::Windows {
        "bat"
    } else {
        "sh"
    };
    let wrapper_path = hosts_dir.join(format!("{NATIVE_HOST_NAME}.{wrapper_ext}"));
    if fs::metadata(&wrapper_path).await.is_ok() {
        fs::remove_file(&wrapper_path).await?;
    }

    #[cfg(windows)]
    uninstall_windows_registry()?;

    Ok(())
}

#[cfg(windows)]
fn setup_windows_registry(manifest_path: &std::path::Path) -> Result<(), InstallError> {
    use winreg::enums::*;
    use winreg::RegKey;

    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let path = format!("Software\\Google\\Chrome\\NativeMessagingHosts\\{NATIVE_HOST_NAME}");

    let (key, _) = hkcu
        .create_subkey(&path)
        .map_err(|e| InstallError::Registry(e.to_string()))?;

    let manifest_str: String = manifest_path.to_string_lossy().to_string();
    key.set_value("", &manifest_str)
        .map_err(|e| InstallError::Registry(e.to_string()))?;

    Ok(())
}

#[cfg(windows)]
fn uninstall_windows_registry() -> Result<(), InstallError> {
    use winreg::enums::*;
    use winreg::RegKey;

    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let path = format!("Software\\Google\\Chrome\\NativeMessagingHosts\\{NATIVE_HOST_NAME}");

    // 键可能本就不存在
    let _ = hkcu.delete_subkey(&path);
    Ok(())
}
