//! `esp-radio` station driver behind the supervisor's join primitive.

use core::net::Ipv4Addr;

use corelink::{
    config::AuthMode,
    supervisor::{JoinRequest, Radio},
};
use embassy_executor::Spawner;
use embassy_net::{Stack, StackResources};
use embassy_sync::once_lock::OnceLock;
use esp_hal::{peripherals::WIFI, rng::Rng};
use esp_radio::wifi::{
    AuthMethod, ClientConfig, InternalWifiError, ModeConfig, ScanMethod, WifiController,
    WifiError,
};
use static_cell::StaticCell;

use super::tasks::net_task;

/// Network stack handle, published once the radio is up.
pub(crate) static NET_STACK: OnceLock<Stack<'static>> = OnceLock::new();

pub(crate) struct EspRadio {
    /// Boot-time handle; `None` once a `wifi::new` call has consumed it.
    wifi: Option<WIFI<'static>>,
    spawner: Spawner,
    radio_ctrl: Option<&'static esp_radio::Controller<'static>>,
    controller: Option<WifiController<'static>>,
    stack: Option<Stack<'static>>,
    started: bool,
}

impl EspRadio {
    pub(crate) fn new(wifi: WIFI<'static>, spawner: Spawner) -> Self {
        Self {
            wifi: Some(wifi),
            spawner,
            radio_ctrl: None,
            controller: None,
            stack: None,
            started: false,
        }
    }

    fn radio_controller(
        &mut self,
    ) -> Result<&'static esp_radio::Controller<'static>, &'static str> {
        static RADIO_CTRL: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();

        if let Some(radio_ctrl) = self.radio_ctrl {
            return Ok(radio_ctrl);
        }
        let radio_ctrl = esp_radio::init().map_err(|err| {
            log::error!("radio: esp_radio::init err={:?}", err);
            "radio: esp_radio::init failed"
        })?;
        let radio_ctrl: &'static esp_radio::Controller<'static> = RADIO_CTRL
            .try_init(radio_ctrl)
            .ok_or("radio: controller cell already claimed")?;
        self.radio_ctrl = Some(radio_ctrl);
        Ok(radio_ctrl)
    }

    fn wifi_peripheral(&mut self) -> WIFI<'static> {
        match self.wifi.take() {
            Some(wifi) => wifi,
            // SAFETY: the previous handle was moved into a `wifi::new` call
            // whose result was dropped on failure, so no driver owns WIFI.
            None => unsafe { WIFI::steal() },
        }
    }

    async fn ensure_started(&mut self) -> Result<(), &'static str> {
        let controller = self.controller.as_mut().ok_or("radio: not initialized")?;
        if self.started && matches!(controller.is_started(), Ok(true)) {
            return Ok(());
        }
        controller
            .start_async()
            .await
            .map_err(|err| wifi_error_label(&err))?;
        self.started = true;
        Ok(())
    }
}

impl Radio for EspRadio {
    type Error = &'static str;

    async fn init(&mut self) -> Result<(), Self::Error> {
        if self.controller.is_some() {
            return Ok(());
        }

        static STACK_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();

        let radio_ctrl = self.radio_controller()?;
        let wifi = self.wifi_peripheral();
        let (controller, ifaces) = esp_radio::wifi::new(radio_ctrl, wifi, Default::default())
            .map_err(|err| wifi_error_label(&err))?;

        let rng = Rng::new();
        let seed = (rng.random() as u64) << 32 | rng.random() as u64;
        let (stack, runner) = embassy_net::new(
            ifaces.sta,
            embassy_net::Config::dhcpv4(Default::default()),
            STACK_RESOURCES
                .try_init(StackResources::<3>::new())
                .ok_or("radio: stack resources already claimed")?,
            seed,
        );
        self.spawner
            .spawn(net_task(runner))
            .map_err(|_| "radio: net task spawn failed")?;
        let _ = NET_STACK.init(stack);

        self.controller = Some(controller);
        self.stack = Some(stack);
        Ok(())
    }

    async fn enable_station(&mut self) -> Result<(), Self::Error> {
        self.started = false;
        self.ensure_started().await
    }

    async fn join(&mut self, request: JoinRequest<'_>) -> Result<(), Self::Error> {
        let mode = client_mode(&request).ok_or("radio: credentials are not utf-8")?;
        let controller = self.controller.as_mut().ok_or("radio: not initialized")?;
        if matches!(controller.is_connected(), Ok(true)) {
            let _ = controller.disconnect_async().await;
        }
        controller
            .set_config(&mode)
            .map_err(|err| wifi_error_label(&err))?;
        self.ensure_started().await?;

        let controller = self.controller.as_mut().ok_or("radio: not initialized")?;
        controller
            .connect_async()
            .await
            .map_err(|err| wifi_error_label(&err))?;

        // Association alone is not a usable link; the caller's timeout also
        // covers the DHCP lease.
        let stack = self.stack.ok_or("radio: no network stack")?;
        stack.wait_config_up().await;
        Ok(())
    }

    fn link_up(&mut self) -> bool {
        let associated = self
            .controller
            .as_ref()
            .is_some_and(|controller| matches!(controller.is_connected(), Ok(true)));
        associated
            && self
                .stack
                .is_some_and(|stack| stack.is_link_up() && stack.config_v4().is_some())
    }

    fn ipv4(&self) -> Option<Ipv4Addr> {
        let config = self.stack?.config_v4()?;
        Some(config.address.address())
    }
}

fn client_mode(request: &JoinRequest<'_>) -> Option<ModeConfig> {
    let ssid = request.credentials.ssid()?;
    let password = request.credentials.password()?;
    let client = ClientConfig::default()
        .with_ssid(ssid.into())
        .with_password(password.into())
        .with_auth_method(auth_method(request.auth_mode))
        .with_scan_method(ScanMethod::AllChannels);
    Some(ModeConfig::Client(client))
}

fn auth_method(mode: AuthMode) -> AuthMethod {
    match mode {
        AuthMode::Open => AuthMethod::None,
        AuthMode::Wpa2Personal => AuthMethod::Wpa2Personal,
        AuthMode::WpaWpa2Personal => AuthMethod::WpaWpa2Personal,
        AuthMode::Wpa3Personal => AuthMethod::Wpa3Personal,
    }
}

fn wifi_error_label(err: &WifiError) -> &'static str {
    match err {
        WifiError::InvalidArguments => "radio: wifi invalid_args",
        WifiError::Unsupported => "radio: wifi unsupported",
        WifiError::NotInitialized => "radio: wifi not_initialized",
        WifiError::InternalError(InternalWifiError::NoMem) => "radio: wifi no_mem",
        _ => "radio: wifi error",
    }
}
